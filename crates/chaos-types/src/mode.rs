// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::Error;
use schemars::{gen::SchemaGenerator, schema::Schema, JsonSchema};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Target-count policy applied to the resolved candidate set.
///
/// The companion `value` string is interpreted per mode: a count for
/// `fixed`, a percentage in `(0, 100]` for `fixed-percent`, an upper bound
/// percentage in `[0, 100]` for `random-max-percent`, and ignored otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mode {
    #[default]
    One,
    All,
    Fixed,
    FixedPercent,
    RandomMaxPercent,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::One => "one",
            Mode::All => "all",
            Mode::Fixed => "fixed",
            Mode::FixedPercent => "fixed-percent",
            Mode::RandomMaxPercent => "random-max-percent",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one" => Ok(Mode::One),
            "all" => Ok(Mode::All),
            "fixed" => Ok(Mode::Fixed),
            "fixed-percent" => Ok(Mode::FixedPercent),
            "random-max-percent" => Ok(Mode::RandomMaxPercent),
            other => Err(Error::UnsupportedMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// Serialized as a plain string; validation happens on decode.
impl JsonSchema for Mode {
    fn schema_name() -> String {
        "Mode".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.as_str().to_string()
    }
}
