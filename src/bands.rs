//! Spectral bands of the Sentinel-2 MultiSpectral Instrument
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq)]
pub struct Band {
    pub name: &'static str,
    pub description: &'static str,
    pub common_name: &'static str,
}

pub static SENTINEL2_BANDS: [Band; 13] = [
    Band {
        name: "B01",
        description: "Coastal: 400 - 450 nm",
        common_name: "coastal",
    },
    Band {
        name: "B02",
        description: "Blue: 450 - 500 nm",
        common_name: "blue",
    },
    Band {
        name: "B03",
        description: "Green: 500 - 600 nm",
        common_name: "green",
    },
    Band {
        name: "B04",
        description: "Red: 600 - 700 nm",
        common_name: "red",
    },
    Band {
        name: "B05",
        description: "Vegetation Red Edge: 705 nm",
        common_name: "rededge",
    },
    Band {
        name: "B06",
        description: "Vegetation Red Edge: 740 nm",
        common_name: "rededge",
    },
    Band {
        name: "B07",
        description: "Vegetation Red Edge: 783 nm",
        common_name: "rededge",
    },
    Band {
        name: "B08",
        description: "Near-IR: 750 - 1000 nm",
        common_name: "nir",
    },
    Band {
        name: "B8A",
        description: "Near-IR: 750 - 900 nm",
        common_name: "nir08",
    },
    Band {
        name: "B09",
        description: "Water vapour: 850 - 1050 nm",
        common_name: "nir09",
    },
    Band {
        name: "B10",
        description: "SWIR-Cirrus: 1350 - 1400 nm",
        common_name: "cirrus",
    },
    Band {
        name: "B11",
        description: "SWIR16: 1550 - 1750 nm",
        common_name: "swir16",
    },
    Band {
        name: "B12",
        description: "SWIR22: 2100 - 2300 nm",
        common_name: "swir22",
    },
];

pub fn lookup(code: &str) -> Option<&'static Band> {
    SENTINEL2_BANDS.iter().find(|band| band.name == code)
}

/// A band as it appears in `eo:bands` arrays
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EoBand {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
}

impl From<&Band> for EoBand {
    fn from(band: &Band) -> Self {
        Self {
            name: band.name.to_string(),
            description: Some(band.description.to_string()),
            common_name: Some(band.common_name.to_string()),
        }
    }
}

pub fn all_eo_bands() -> Vec<EoBand> {
    SENTINEL2_BANDS.iter().map(EoBand::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("B8A").unwrap().common_name, "nir08");
        assert_eq!(lookup("B10").unwrap().common_name, "cirrus");
        assert!(lookup("TCI").is_none());
        assert!(lookup("SCL").is_none());
    }

    #[test]
    fn test_all_eo_bands() {
        let bands = all_eo_bands();
        assert_eq!(bands.len(), 13);
        assert_eq!(bands[0].name, "B01");
        assert_eq!(bands[12].common_name.as_deref(), Some("swir22"));
    }
}
