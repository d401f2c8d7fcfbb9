//! The opponent roster: who the player fights, in order, and with which
//! rule set. Stands in for the narrative loader of the full game - opponents
//! are looked up by name and carry their intro line with them.

use batris_engine::{OpponentRules, PiecePool, Shape, SpinDir};

#[derive(Clone, Debug)]
pub struct Opponent {
    pub name: &'static str,
    pub intro: &'static str,
    pub rules: OpponentRules,
}

/// The campaign, easiest first.
pub fn roster() -> Vec<Opponent> {
    vec![
        Opponent {
            name: "Slugger",
            intro: "Just you, me, and seven honest shapes.",
            rules: OpponentRules {
                gauge_max: 60,
                ..OpponentRules::default()
            },
        },
        Opponent {
            name: "Monomaniac",
            intro: "One shape. Over and over. Forever.",
            rules: OpponentRules {
                pool: PiecePool::single(Shape::O),
                gauge_max: 80,
                ..OpponentRules::default()
            },
        },
        Opponent {
            name: "Vertigo",
            intro: "Hope you don't mind a little lean.",
            rules: OpponentRules {
                tilt: Some(SpinDir::Right),
                gauge_max: 90,
                ..OpponentRules::default()
            },
        },
        Opponent {
            name: "Poltergeist",
            intro: "Left is right. Sometimes. Good luck.",
            rules: OpponentRules {
                drift: true,
                gauge_max: 100,
                ..OpponentRules::default()
            },
        },
        Opponent {
            name: "Conveyor",
            intro: "The floor moves with you. Or against you.",
            rules: OpponentRules {
                self_scroll: true,
                pool: PiecePool::restricted(vec![Shape::I, Shape::O, Shape::Dot, Shape::Duo]),
                gauge_max: 110,
                ..OpponentRules::default()
            },
        },
        Opponent {
            name: "Metronome",
            intro: "Tick. Tock. That's your health going.",
            rules: OpponentRules {
                rapid_damage: true,
                reel: Some(SpinDir::Left),
                gauge_max: 120,
                ..OpponentRules::default()
            },
        },
        Opponent {
            name: "Ringmaster",
            intro: "Every shape in the book, and the book is crooked.",
            rules: OpponentRules {
                pool: PiecePool::restricted(Shape::ALL.to_vec()),
                tilt: Some(SpinDir::Left),
                reel: Some(SpinDir::Right),
                gauge_max: 150,
                ..OpponentRules::default()
            },
        },
    ]
}

/// Fetches one opponent configuration by name.
pub fn by_name(name: &str) -> Option<Opponent> {
    roster()
        .into_iter()
        .find(|opponent| opponent.name.eq_ignore_ascii_case(name))
}
