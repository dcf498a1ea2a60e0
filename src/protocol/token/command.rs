//! DS4QB2 command decoding
//!
//! The signal byte is the opcode. Parameters live in `DS4QB2.DAT` as
//! whitespace-separated tokens, except for SetPosition which stores three
//! little-endian `u32` words.

use nom::number::complete::le_u32;
use nom::sequence::tuple;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::channels::SlotId;
use crate::protocol::filename::{join_guest_path, resolve_guest_path};
use crate::protocol::DecodeError;

/// Signal values at or above this play sample `signal - PLAY_SFX_BASE`
pub const PLAY_SFX_BASE: u16 = 56;

/// DS4QB2 opcodes below the PlaySfx range
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[allow(missing_docs)]
pub enum Opcode {
    PlayMusic = 1,
    ClearMusic = 2,
    LoadSfx = 3,
    SetVolume = 4,
    SetEax = 5,
    StopSfx = 6,
    Set3d = 7,
    SetChannel = 8,
    Pan = 9,
    Fade = 10,
    FeedbackMod = 11,
    FeedbackMp3 = 12,
    SetPosition = 13,
    Pause = 14,
    Resume = 15,
    Exit = 55,
}

/// Decoded DS4QB2 command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Load music into a channel and start it
    PlayMusic {
        /// Guest path of the music file
        path: String,
        /// Whether the file is a compressed stream rather than a module
        stream: bool,
        /// Target music channel
        channel: SlotId,
        /// Loop playback
        repeat: bool,
    },
    /// Stop a music channel
    ClearMusic {
        /// Music channel
        channel: SlotId,
    },
    /// Append samples at sequential ids
    LoadSfx {
        /// Guest paths, one per sample
        paths: Vec<String>,
    },
    /// Set music, sample and stream volumes (0-100)
    SetVolume {
        /// Tracker module volume
        music: u16,
        /// Sample volume
        sample: u16,
        /// Stream volume
        stream: u16,
    },
    /// Stop a sample
    StopSfx {
        /// Sample id
        index: SlotId,
    },
    /// Fade a stream
    Fade {
        /// Music channel
        channel: SlotId,
        /// Start volume (0-100)
        from: u16,
        /// End volume (0-100)
        to: u16,
        /// Volume units per millisecond
        speed: u32,
    },
    /// Module position feedback request
    FeedbackMod {
        /// Music channel
        channel: SlotId,
    },
    /// Stream position feedback request
    FeedbackMp3 {
        /// Music channel
        channel: SlotId,
    },
    /// Position change request (logged only)
    SetPosition {
        /// Music channel
        channel: u32,
        /// First position word
        pos1: u32,
        /// Second position word
        pos2: u32,
    },
    /// Pause a music channel
    Pause {
        /// Music channel
        channel: SlotId,
    },
    /// Resume a music channel
    Resume {
        /// Music channel
        channel: SlotId,
    },
    /// Stop and release everything
    Exit,
    /// Play a sample with its stored attributes
    PlaySfx {
        /// Sample id
        index: SlotId,
    },
    /// EAX, 3D, SetChannel and Pan; accepted and logged
    Ignored {
        /// Opcode
        opcode: Opcode,
        /// Raw parameter tokens
        tokens: Vec<String>,
    },
    /// Signal value outside the table
    Unknown(u16),
}

/// Whitespace-separated tokens of a DAT file
pub fn tokens(dat: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(dat)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

struct Params<'a> {
    command: &'static str,
    tokens: &'a [String],
}

impl<'a> Params<'a> {
    fn new(command: &'static str, tokens: &'a [String]) -> Self {
        Self { command, tokens }
    }

    fn text(&self, index: usize) -> Result<&'a str, DecodeError> {
        self.tokens
            .get(index)
            .map(String::as_str)
            .ok_or(DecodeError::MissingToken {
                command: self.command,
                index,
            })
    }

    fn number<T: std::str::FromStr>(&self, index: usize) -> Result<T, DecodeError> {
        let token = self.text(index)?;
        token.parse().map_err(|_| DecodeError::InvalidNumber {
            command: self.command,
            token: token.to_string(),
        })
    }
}

fn position_words(signal: u16, dat: &[u8]) -> Result<Command, DecodeError> {
    let parsed: nom::IResult<&[u8], (u32, u32, u32)> = tuple((le_u32, le_u32, le_u32))(dat);
    let (_, (channel, pos1, pos2)) = parsed.map_err(|_| DecodeError::Truncated {
        opcode: signal,
        needed: 12,
        got: dat.len(),
    })?;
    Ok(Command::SetPosition { channel, pos1, pos2 })
}

/// Decode one DS4QB2 command from its signal value and DAT contents
pub fn decode(signal: u16, dat: &[u8], working_dir: &str) -> Result<Command, DecodeError> {
    if signal >= PLAY_SFX_BASE {
        return Ok(Command::PlaySfx {
            index: SlotId::from(signal - PLAY_SFX_BASE),
        });
    }
    let Some(opcode) = Opcode::from_u16(signal) else {
        return Ok(Command::Unknown(signal));
    };

    let tokens = tokens(dat);
    let channel = |command| Params::new(command, &tokens).number::<SlotId>(0);

    let command = match opcode {
        Opcode::PlayMusic => {
            // token 1 is the music type, inferred from the extension instead
            let p = Params::new("PlayMusic", &tokens);
            let file = p.text(0)?;
            Command::PlayMusic {
                path: join_guest_path(working_dir, file),
                stream: file.to_ascii_uppercase().ends_with(".MP3"),
                channel: p.number(2)?,
                repeat: p.number::<i64>(3)? != 0,
            }
        }
        Opcode::ClearMusic => Command::ClearMusic {
            channel: channel("ClearMusic")?,
        },
        Opcode::LoadSfx => Command::LoadSfx {
            paths: tokens
                .iter()
                .map(|file| resolve_guest_path(file, working_dir))
                .collect(),
        },
        Opcode::SetVolume => {
            let p = Params::new("SetVolume", &tokens);
            Command::SetVolume {
                music: p.number(0)?,
                sample: p.number(1)?,
                stream: p.number(2)?,
            }
        }
        Opcode::StopSfx => Command::StopSfx {
            index: channel("StopSfx")?,
        },
        Opcode::Fade => {
            let p = Params::new("Fade", &tokens);
            let speed = p.number(3)?;
            if speed == 0 {
                return Err(DecodeError::ZeroFadeSpeed);
            }
            Command::Fade {
                channel: p.number(0)?,
                from: p.number(1)?,
                to: p.number(2)?,
                speed,
            }
        }
        Opcode::FeedbackMod => Command::FeedbackMod {
            channel: channel("FeedbackMod")?,
        },
        Opcode::FeedbackMp3 => Command::FeedbackMp3 {
            channel: channel("FeedbackMp3")?,
        },
        Opcode::Pause => Command::Pause {
            channel: channel("Pause")?,
        },
        Opcode::Resume => Command::Resume {
            channel: channel("Resume")?,
        },
        Opcode::SetPosition => position_words(signal, dat)?,
        Opcode::Exit => Command::Exit,
        Opcode::SetEax | Opcode::Set3d | Opcode::SetChannel | Opcode::Pan => Command::Ignored {
            opcode,
            tokens: tokens.clone(),
        },
    };
    Ok(command)
}
