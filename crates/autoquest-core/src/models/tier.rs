use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Priority class of a tag. Declaration order is priority order:
/// `TimeLimited < Group < Single`, lower runs first in every round.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    TimeLimited,
    Group,
    Single,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::TimeLimited, Tier::Group, Tier::Single];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::TimeLimited => "time_limited",
            Tier::Group => "group",
            Tier::Single => "single",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Tier::TimeLimited => 0,
            Tier::Group => 1,
            Tier::Single => 2,
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == raw)
            .ok_or(())
    }
}
