//! IP country lookup using a MaxMind database
//!
//! The risk scanner compares every IP linked to a new player against a
//! blacklist of ISO country codes. Lookups go through the MaxMind
//! GeoLite2-Country database; the file must be downloaded separately
//! (free with registration).

use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during country lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),

    #[error("Database file not found: {0}")]
    FileNotFound(String),
}

/// Country lookup service over a GeoLite2-Country database.
pub struct CountryLookup {
    reader: Arc<Reader<Vec<u8>>>,
}

impl CountryLookup {
    /// Open the database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not a valid MaxMind
    /// database.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }

        let reader = Reader::open_readfile(path)?;
        Ok(CountryLookup {
            reader: Arc::new(reader),
        })
    }

    /// ISO country code for an IP, or `None` when the address is
    /// unparseable or not in the database. Log-file IPs are strings of
    /// unknown quality, so parse failures are expected and quiet.
    pub fn country_code(&self, ip: &str) -> Option<String> {
        let addr = IpAddr::from_str(ip.trim()).ok()?;
        let country: geoip2::Country = self.reader.lookup(addr).ok()?;
        country
            .country
            .and_then(|c| c.iso_code)
            .map(|code| code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_is_an_error() {
        let result = CountryLookup::new("/nonexistent/GeoLite2-Country.mmdb");
        assert!(matches!(result, Err(GeoError::FileNotFound(_))));
    }
}
