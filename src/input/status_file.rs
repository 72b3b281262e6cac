//! Server status file parsing
//!
//! Each local game server exports a single-line status file into its base
//! directory: semicolon-delimited fields wrapped in light HTML markup,
//! ending in a `ckey_list=` field with `&`-joined player names. The
//! positional layout after stripping markup is:
//!
//! ```text
//! [0]=status [1]=address [2]=map [3]=gamemode [4]=playercount
//! [5]=realtime [6]=world.address [7]=round_timer [8]=map [9]=epoch
//! [10]=season [11]=ckey_list
//! ```

use crate::models::canonical_ckey;
use crate::storage::StorageError;
use regex::Regex;
use std::path::Path;

/// Status file name inside a server's base directory.
pub const SERVERDATA_FILE: &str = "serverdata.txt";

/// Decoration prefixes the game writes in front of the positional fields.
const FIELD_PREFIXES: [&str; 9] = [
    "Address: ",
    "Map: ",
    "Gamemode: ",
    "Players: ",
    "round_timer=",
    "map=",
    "epoch=",
    "season=",
    "ckey_list=",
];

/// Snapshot of one server's exported status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStatus {
    pub playercount: usize,
    /// Currently connected players, canonicalized to ckeys.
    pub players: Vec<String>,
    pub map: Option<String>,
    pub round_timer: Option<String>,
}

/// Parse a status export. Missing fields degrade to defaults; the file
/// is rewritten mid-round by the game and may be truncated at any point.
pub fn parse_status(data: &str) -> ServerStatus {
    // The markup is not real HTML, a literal strip is all it takes
    let markup = Regex::new(r"</?b>").expect("static pattern");
    let mut cleaned = markup.replace_all(data, "").into_owned();
    for prefix in FIELD_PREFIXES {
        cleaned = cleaned.replace(prefix, "");
    }

    let fields: Vec<&str> = cleaned.split(';').map(str::trim).collect();
    let playercount = fields
        .get(4)
        .and_then(|f| f.parse::<usize>().ok())
        .unwrap_or(0);
    let players = fields
        .get(11)
        .map(|list| {
            list.split('&')
                .map(canonical_ckey)
                .filter(|ckey| !ckey.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ServerStatus {
        playercount,
        players,
        map: fields.get(8).filter(|f| !f.is_empty()).map(|f| f.to_string()),
        round_timer: fields.get(7).filter(|f| !f.is_empty()).map(|f| f.to_string()),
    }
}

/// Read and parse a server's status file.
pub fn read_status(basedir: &Path) -> Result<ServerStatus, StorageError> {
    let path = basedir.join(SERVERDATA_FILE);
    let data = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
        path,
        source,
    })?;
    Ok(parse_status(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<b>Server Status</b> Online;<b>Address</b>: byond://1.2.3.4:1234;\
<b>Map</b>: delta;<b>Gamemode</b>: tdm;<b>Players</b>: 3;realtime=12345;\
world.address=1.2.3.4;round_timer=02:30;map=delta;epoch=1700000000;season=winter;\
ckey_list=Player_One&ptwo&P.Three";

    #[test]
    fn test_parse_full_status() {
        let status = parse_status(SAMPLE);
        assert_eq!(status.playercount, 3);
        assert_eq!(status.players, vec!["playerone", "ptwo", "pthree"]);
        assert_eq!(status.map.as_deref(), Some("delta"));
        assert_eq!(status.round_timer.as_deref(), Some("02:30"));
    }

    #[test]
    fn test_parse_truncated_status() {
        let status = parse_status("<b>Server Status</b> Online;<b>Address</b>: byond://x");
        assert_eq!(status.playercount, 0);
        assert!(status.players.is_empty());
        assert!(status.map.is_none());
    }

    #[test]
    fn test_parse_empty_player_list() {
        let status = parse_status(&SAMPLE.replace("Player_One&ptwo&P.Three", ""));
        assert_eq!(status.playercount, 3);
        assert!(status.players.is_empty());
    }

    #[test]
    fn test_read_status_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(read_status(tmp.path()).is_err());
    }
}
