//! Request enumerations shared by the query surface and the tile endpoint.
//!
//! Integer codes are part of the wire contract (tile URLs and layer names
//! carry them), so they are fixed explicitly.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An integer that does not name any variant of the target enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown {kind} code {code}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: i32,
}

/// Emitted pollutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Emission {
    #[default]
    Unspecified = 0,
    PM2_5 = 1,
    NH3 = 2,
    NOx = 3,
    SOx = 4,
    VOC = 5,
}

impl Emission {
    pub const ALL: [Emission; 5] = [
        Emission::PM2_5,
        Emission::NH3,
        Emission::NOx,
        Emission::SOx,
        Emission::VOC,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parse a pollutant name as written on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pm2_5" | "pm25" | "pm2.5" => Some(Self::PM2_5),
            "nh3" => Some(Self::NH3),
            "nox" => Some(Self::NOx),
            "sox" => Some(Self::SOx),
            "voc" => Some(Self::VOC),
            _ => None,
        }
    }
}

impl TryFrom<i32> for Emission {
    type Error = UnknownCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Unspecified),
            1 => Ok(Self::PM2_5),
            2 => Ok(Self::NH3),
            3 => Ok(Self::NOx),
            4 => Ok(Self::SOx),
            5 => Ok(Self::VOC),
            _ => Err(UnknownCode {
                kind: "emission",
                code,
            }),
        }
    }
}

impl fmt::Display for Emission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unspecified => "Unspecified",
            Self::PM2_5 => "PM2_5",
            Self::NH3 => "NH3",
            Self::NOx => "NOx",
            Self::SOx => "SOx",
            Self::VOC => "VOC",
        };
        f.write_str(name)
    }
}

/// Kind of quantity shown on a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImpactType {
    #[default]
    Unspecified = 0,
    Emissions = 1,
    Concentrations = 2,
}

impl ImpactType {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ImpactType {
    type Error = UnknownCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Unspecified),
            1 => Ok(Self::Emissions),
            2 => Ok(Self::Concentrations),
            _ => Err(UnknownCode {
                kind: "impact type",
                code,
            }),
        }
    }
}

impl fmt::Display for ImpactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unspecified => "Unspecified",
            Self::Emissions => "Emissions",
            Self::Concentrations => "Concentrations",
        };
        f.write_str(name)
    }
}

/// Which emissions a simulation includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SimulationType {
    /// A unit emission of one pollutant spread over the city (or its egugrid
    /// region).
    #[default]
    CityMarginal = 0,
    /// One inventory sector, masked to the city.
    CityTotal = 1,
    /// One inventory sector, everywhere.
    Total = 2,
}

impl SimulationType {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for SimulationType {
    type Error = UnknownCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::CityMarginal),
            1 => Ok(Self::CityTotal),
            2 => Ok(Self::Total),
            _ => Err(UnknownCode {
                kind: "simulation type",
                code,
            }),
        }
    }
}

impl fmt::Display for SimulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CityMarginal => "CityMarginal",
            Self::CityTotal => "CityTotal",
            Self::Total => "Total",
        };
        f.write_str(name)
    }
}
