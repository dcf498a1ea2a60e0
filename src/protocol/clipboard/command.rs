//! DS4QB1 command text
//!
//! Commands are a keyword immediately followed by `|`-separated arguments,
//! for example `LOADMODC:\GAME\SONG.XM|1`.

use crate::protocol::DecodeError;

/// Decoded DS4QB1 command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load a tracker module and start it
    LoadMod {
        /// Guest path of the module
        path: String,
        /// Loop playback
        looping: bool,
    },
    /// Append the samples named in a CRLF-separated list file
    LoadSamples {
        /// Guest path of the list file
        list_path: String,
    },
    /// Load a compressed stream and start it
    LoadStream {
        /// Guest path of the stream
        path: String,
        /// Loop playback
        looping: bool,
    },
    /// CD audio request (logged only)
    PlayCd {
        /// Raw track argument
        track: String,
    },
    /// Play a sample by its 1-based id
    PlaySample {
        /// Sample id
        id: u32,
    },
    /// Stop and release the module
    RemoveModule,
    /// Stop and release every sample
    RemoveSamples,
    /// Stop and release the stream
    RemoveStream,
    /// Marker matched but the keyword did not
    Unknown(String),
}

fn arguments(rest: &str) -> (&str, bool) {
    let mut parts = rest.split('|');
    let first = parts.next().unwrap_or_default();
    let looping = parts.next() == Some("1");
    (first, looping)
}

/// Decode command text with the `DS4QB` marker already removed
pub fn decode(text: &str) -> Result<Command, DecodeError> {
    let command = if let Some(rest) = text.strip_prefix("LOADMOD") {
        let (path, looping) = arguments(rest);
        Command::LoadMod {
            path: path.to_string(),
            looping,
        }
    } else if let Some(rest) = text.strip_prefix("LOADSAMPLES") {
        Command::LoadSamples {
            list_path: arguments(rest).0.to_string(),
        }
    } else if let Some(rest) = text.strip_prefix("LOADSTREAM") {
        let (path, looping) = arguments(rest);
        Command::LoadStream {
            path: path.to_string(),
            looping,
        }
    } else if let Some(rest) = text.strip_prefix("PLAYCD") {
        Command::PlayCd {
            track: arguments(rest).0.to_string(),
        }
    } else if let Some(rest) = text.strip_prefix("PLAYSAMPLE") {
        let token = arguments(rest).0.trim();
        let id = token.parse().map_err(|_| DecodeError::InvalidNumber {
            command: "PLAYSAMPLE",
            token: token.to_string(),
        })?;
        Command::PlaySample { id }
    } else if text.starts_with("REMOVEMODULE|") {
        Command::RemoveModule
    } else if text.starts_with("REMOVESAMPLES|") {
        Command::RemoveSamples
    } else if text.starts_with("REMOVESTREAM|") {
        Command::RemoveStream
    } else {
        Command::Unknown(text.to_string())
    };
    Ok(command)
}

/// Non-empty lines of a sample list file
pub fn sample_list(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split("\r\n")
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_commands() {
        assert_eq!(
            decode("LOADMODC:\\GAME\\SONG.XM|1").unwrap(),
            Command::LoadMod {
                path: "C:\\GAME\\SONG.XM".into(),
                looping: true
            }
        );
        assert_eq!(
            decode("LOADSTREAMTITLE.MP3|0").unwrap(),
            Command::LoadStream {
                path: "TITLE.MP3".into(),
                looping: false
            }
        );
        assert_eq!(
            decode("LOADSAMPLESSFX.LST|").unwrap(),
            Command::LoadSamples {
                list_path: "SFX.LST".into()
            }
        );
    }

    #[test]
    fn test_loop_flag_must_be_one() {
        let Command::LoadMod { looping, .. } = decode("LOADMODA.MOD|2").unwrap() else {
            panic!("expected LoadMod");
        };
        assert!(!looping);
        let Command::LoadMod { looping, .. } = decode("LOADMODA.MOD").unwrap() else {
            panic!("expected LoadMod");
        };
        assert!(!looping);
    }

    #[test]
    fn test_play_sample() {
        assert_eq!(decode("PLAYSAMPLE3|").unwrap(), Command::PlaySample { id: 3 });
        assert!(matches!(
            decode("PLAYSAMPLEx|"),
            Err(DecodeError::InvalidNumber { command: "PLAYSAMPLE", .. })
        ));
    }

    #[test]
    fn test_remove_requires_separator() {
        assert_eq!(decode("REMOVEMODULE|").unwrap(), Command::RemoveModule);
        assert_eq!(decode("REMOVESAMPLES|").unwrap(), Command::RemoveSamples);
        assert_eq!(decode("REMOVESTREAM|").unwrap(), Command::RemoveStream);
        assert_eq!(decode("REMOVESTREAM").unwrap(), Command::Unknown("REMOVESTREAM".into()));
    }

    #[test]
    fn test_sample_list_drops_empty_lines() {
        assert_eq!(sample_list(b"A.WAV\r\n\r\nB.WAV\r\n"), vec!["A.WAV", "B.WAV"]);
    }
}
