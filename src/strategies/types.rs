use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Which bucket to back and whether the model sees an edge over the market.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub bucket: Option<String>,
    pub market_price: Option<f64>,
    pub edge: bool,
}

impl Recommendation {
    pub fn side(&self) -> Side {
        if self.edge {
            Side::Yes
        } else {
            Side::No
        }
    }
}
