//! Coordinate Reference System handling

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad family of a coordinate reference system.
///
/// Distances are only in metric units when the grid is in a projected
/// system; the engine still runs otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrsKind {
    Projected,
    Geographic,
    Unknown,
}

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    kind: CrsKind,
}

impl CRS {
    /// Create a CRS from an EPSG code of unknown family
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            kind: CrsKind::Unknown,
        }
    }

    /// Projected CRS with an EPSG code
    pub fn projected(code: u32) -> Self {
        Self {
            kind: CrsKind::Projected,
            ..Self::from_epsg(code)
        }
    }

    /// Geographic CRS with an EPSG code
    pub fn geographic(code: u32) -> Self {
        Self {
            kind: CrsKind::Geographic,
            ..Self::from_epsg(code)
        }
    }

    /// Create a CRS from a WKT string, inferring the family from its root keyword
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        let wkt = wkt.into();
        let head = wkt.trim_start().to_ascii_uppercase();
        let kind = if head.starts_with("PROJCS") || head.starts_with("PROJCRS") {
            CrsKind::Projected
        } else if head.starts_with("GEOGCS") || head.starts_with("GEOGCRS") {
            CrsKind::Geographic
        } else {
            CrsKind::Unknown
        };
        Self {
            wkt: Some(wkt),
            epsg: None,
            kind,
        }
    }

    /// CRS known only by family, without an EPSG code or WKT
    pub fn unnamed(kind: CrsKind) -> Self {
        Self {
            wkt: None,
            epsg: None,
            kind,
        }
    }

    /// Attach a family to an existing CRS
    pub fn with_kind(mut self, kind: CrsKind) -> Self {
        self.kind = kind;
        self
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::geographic(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    pub fn kind(&self) -> CrsKind {
        self.kind
    }

    /// Whether distances in this CRS are in linear (usually metric) units
    pub fn is_projected(&self) -> bool {
        self.kind == CrsKind::Projected
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            // Return first 50 chars of WKT
            return format!("WKT:{}", wkt.chars().take(50).collect::<String>());
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::projected(31983);
        assert_eq!(crs.epsg(), Some(31983));
        assert_eq!(crs.identifier(), "EPSG:31983");
        assert!(crs.is_projected());
    }

    #[test]
    fn test_crs_wkt_kind() {
        let crs = CRS::from_wkt("PROJCS[\"SIRGAS 2000 / UTM zone 23S\",GEOGCS[...]]");
        assert_eq!(crs.kind(), CrsKind::Projected);
        assert!(!CRS::wgs84().is_projected());
        assert_eq!(CRS::from_wkt("LOCAL_CS[\"x\"]").kind(), CrsKind::Unknown);
    }
}
