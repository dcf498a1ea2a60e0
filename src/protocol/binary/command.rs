//! DS4QB++ command layouts
//!
//! Every command starts with a little-endian `u16` opcode. The remaining
//! fields sit at fixed offsets; multi-byte values are little-endian.

use bitflags::bitflags;
use nom::bytes::complete::take;
use nom::combinator::map;
use nom::multi::count;
use nom::number::complete::{le_f32, le_i16, le_u16, le_u32};
use nom::sequence::tuple;
use nom::IResult;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::channels::Listener;
use crate::engine::SoundParams;
use crate::mixer::sentinel::DEFAULT_FLAGS;
use crate::protocol::filename::{decode_name_field, resolve_guest_path};
use crate::protocol::DecodeError;

/// Width of a file name field
pub const NAME_FIELD_LEN: usize = 64;

/// Stride of batched sound entries
pub const ENTRY_LEN: usize = 16;

/// DS4QB++ opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[allow(missing_docs)]
pub enum Opcode {
    Initialize = 0,
    Close = 1,
    Reset = 2,
    LoadSnd = 3,
    PlaySnd = 4,
    SetSndAttr = 5,
    GetSndAttr = 6,
    LoadMusic = 7,
    PlayMusic = 8,
    SetMusicAttr = 9,
    GetMusicAttr = 10,
    StopSnd = 11,
    PauseMusic = 12,
    ResumeMusic = 13,
    StopMusic = 14,
    DeleteSnd = 15,
    DeleteMusic = 16,
    SetVolume = 17,
    SetGlobalVols = 18,
    Play2DSounds = 19,
    Play3DSounds = 20,
    GetMusicLength = 21,
    SetMusicPos = 22,
    GetMusicPos = 23,
    Set3DPos = 24,
    PlaySnd3D = 25,
    Set3DFacts = 26,
    SetEAX = 27,
    PlaySounds = 28,
    PlaySnd2D = 29,
    Set2DPos = 30,
    Set2DDistFactor = 31,
    CDInit = 32,
    CDFree = 33,
    GetTracks = 34,
    GetTrackLength = 35,
    CDPlay = 36,
}

bitflags! {
    /// Flag word of LoadMusic
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MusicFlags: u32 {
        /// Loop the music
        const LOOPING = 0x0000_0004;
    }
}

impl MusicFlags {
    /// Whether a raw flag word requests looping
    ///
    /// The DEFAULT sentinel counts as looping as well.
    pub fn is_looping(raw: u32) -> bool {
        raw == DEFAULT_FLAGS || Self::from_bits_retain(raw).contains(Self::LOOPING)
    }
}

/// Music kind selector of LoadMusic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicType {
    /// Compressed stream
    Stream,
    /// Tracker module
    Tracker,
}

impl From<u16> for MusicType {
    fn from(raw: u16) -> Self {
        if raw == 1 {
            MusicType::Stream
        } else {
            MusicType::Tracker
        }
    }
}

/// One entry of a PlaySounds batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundEntry {
    /// Guest-side queue id
    pub id: u16,
    /// Sound slot
    pub slot: u16,
    /// Attribute words
    pub params: SoundParams,
}

/// One 2D positioned sound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sound2DEntry {
    /// Guest-side queue id
    pub id: u16,
    /// Sound slot
    pub slot: u16,
    /// Frequency word
    pub frequency: u32,
    /// Volume word
    pub volume: u16,
    /// Source x
    pub x: i16,
    /// Source y
    pub y: i16,
    /// Source angle (carried, unused by the mix)
    pub angle: i16,
}

/// Decoded DS4QB++ command
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Command {
    Initialize { quality: u32, flags: u32 },
    Close,
    Reset,
    LoadSnd { slot: u16, path: String, flags: u32 },
    PlaySnd { slot: u16, params: SoundParams },
    SetSndAttr { slot: u16, params: SoundParams, flags: u32 },
    GetSndAttr { slot: u16 },
    LoadMusic { slot: u16, path: String, flags: u32, music_type: MusicType },
    PlayMusic { slot: u16 },
    SetMusicAttr { slot: u16, pan: i16, volume: u16 },
    GetMusicAttr { slot: u16 },
    StopSnd { slot: u16 },
    PauseMusic { slot: u16 },
    ResumeMusic { slot: u16 },
    StopMusic { slot: u16 },
    DeleteSnd { slot: u16 },
    DeleteMusic { slot: u16 },
    SetVolume { volume: u16 },
    SetGlobalVols { sound: u16, music: u16 },
    Play2DSounds { listener: Listener, entries: Vec<Sound2DEntry> },
    GetMusicLength { slot: u16 },
    SetMusicPos { slot: u16, position: u32 },
    GetMusicPos { slot: u16 },
    PlaySounds { entries: Vec<SoundEntry> },
    PlaySnd2D { entry: Sound2DEntry },
    Set2DPos { listener: Listener },
    Set2DDistFactor { factor: f32 },
    /// 3D, EAX and CD commands; accepted and ignored
    Unsupported(Opcode),
    /// Opcode outside the table
    Unknown(u16),
}

type Input<'a> = &'a [u8];

fn sound_params(input: Input) -> IResult<Input, SoundParams> {
    map(tuple((le_u32, le_u16, le_i16, le_u16)), |(frequency, volume, pan, looping)| SoundParams {
        frequency,
        volume,
        pan,
        looping,
    })(input)
}

fn listener(input: Input) -> IResult<Input, Listener> {
    map(tuple((le_i16, le_i16, le_i16)), |(x, y, angle)| Listener { x, y, angle })(input)
}

fn sound_entry(input: Input) -> IResult<Input, SoundEntry> {
    map(tuple((le_u16, le_u16, sound_params, take(2usize))), |(id, slot, params, _)| SoundEntry {
        id,
        slot,
        params,
    })(input)
}

fn sound_2d_entry(input: Input) -> IResult<Input, Sound2DEntry> {
    map(
        tuple((le_u16, le_u16, le_u32, le_u16, le_i16, le_i16, le_i16)),
        |(id, slot, frequency, volume, x, y, angle)| Sound2DEntry {
            id,
            slot,
            frequency,
            volume,
            x,
            y,
            angle,
        },
    )(input)
}

/// Run `parser` over the bytes after the opcode once the buffer holds `needed` bytes
fn fields<'a, O>(
    opcode: Opcode,
    buf: &'a [u8],
    needed: usize,
    mut parser: impl FnMut(Input<'a>) -> IResult<Input<'a>, O>,
) -> Result<O, DecodeError> {
    let truncated = DecodeError::Truncated {
        opcode: opcode as u16,
        needed,
        got: buf.len(),
    };
    if buf.len() < needed {
        return Err(truncated);
    }
    parser(&buf[2..]).map(|(_, out)| out).map_err(|_| truncated)
}

fn slot_only(opcode: Opcode, buf: &[u8]) -> Result<u16, DecodeError> {
    fields(opcode, buf, 4, le_u16)
}

/// Decode one DS4QB++ command; relative file names are resolved against `working_dir`
pub fn decode(buf: &[u8], working_dir: &str) -> Result<Command, DecodeError> {
    if buf.len() < 2 {
        return Err(DecodeError::Empty { got: buf.len() });
    }
    let raw = u16::from_le_bytes([buf[0], buf[1]]);
    let Some(opcode) = Opcode::from_u16(raw) else {
        return Ok(Command::Unknown(raw));
    };

    let command = match opcode {
        Opcode::Initialize => {
            let (quality, flags) = fields(opcode, buf, 10, tuple((le_u32, le_u32)))?;
            Command::Initialize { quality, flags }
        }
        Opcode::Close => Command::Close,
        Opcode::Reset => Command::Reset,
        Opcode::LoadSnd => {
            let (slot, name, flags) = fields(opcode, buf, 72, tuple((le_u16, take(NAME_FIELD_LEN), le_u32)))?;
            let path = resolve_guest_path(&decode_name_field(name), working_dir);
            Command::LoadSnd { slot, path, flags }
        }
        Opcode::PlaySnd => {
            let (slot, params) = fields(opcode, buf, 14, tuple((le_u16, sound_params)))?;
            Command::PlaySnd { slot, params }
        }
        Opcode::SetSndAttr => {
            let (slot, params, flags) = fields(opcode, buf, 18, tuple((le_u16, sound_params, le_u32)))?;
            Command::SetSndAttr { slot, params, flags }
        }
        Opcode::GetSndAttr => Command::GetSndAttr {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::LoadMusic => {
            let (slot, name, flags, music_type) =
                fields(opcode, buf, 74, tuple((le_u16, take(NAME_FIELD_LEN), le_u32, le_u16)))?;
            let path = resolve_guest_path(&decode_name_field(name), working_dir);
            Command::LoadMusic {
                slot,
                path,
                flags,
                music_type: MusicType::from(music_type),
            }
        }
        Opcode::PlayMusic => Command::PlayMusic {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::SetMusicAttr => {
            let (slot, pan, volume) = fields(opcode, buf, 8, tuple((le_u16, le_i16, le_u16)))?;
            Command::SetMusicAttr { slot, pan, volume }
        }
        Opcode::GetMusicAttr => Command::GetMusicAttr {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::StopSnd => Command::StopSnd {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::PauseMusic => Command::PauseMusic {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::ResumeMusic => Command::ResumeMusic {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::StopMusic => Command::StopMusic {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::DeleteSnd => Command::DeleteSnd {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::DeleteMusic => Command::DeleteMusic {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::SetVolume => Command::SetVolume {
            volume: fields(opcode, buf, 4, le_u16)?,
        },
        Opcode::SetGlobalVols => {
            let (sound, music) = fields(opcode, buf, 6, tuple((le_u16, le_u16)))?;
            Command::SetGlobalVols { sound, music }
        }
        Opcode::Play2DSounds => {
            let (listener, n) = fields(opcode, buf, 10, tuple((listener, le_u16)))?;
            let needed = 10 + usize::from(n) * ENTRY_LEN;
            let entries = fields(opcode, buf, needed, |input| {
                let (input, _) = take(8usize)(input)?;
                count(sound_2d_entry, usize::from(n))(input)
            })?;
            Command::Play2DSounds { listener, entries }
        }
        Opcode::GetMusicLength => Command::GetMusicLength {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::SetMusicPos => {
            let (slot, position) = fields(opcode, buf, 8, tuple((le_u16, le_u32)))?;
            Command::SetMusicPos { slot, position }
        }
        Opcode::GetMusicPos => Command::GetMusicPos {
            slot: slot_only(opcode, buf)?,
        },
        Opcode::PlaySounds => {
            let n = fields(opcode, buf, 4, le_u16)?;
            let needed = 4 + usize::from(n) * ENTRY_LEN;
            let entries = fields(opcode, buf, needed, |input| {
                let (input, _) = le_u16(input)?;
                count(sound_entry, usize::from(n))(input)
            })?;
            Command::PlaySounds { entries }
        }
        Opcode::PlaySnd2D => {
            let (slot, frequency, volume, x, y, angle) =
                fields(opcode, buf, 16, tuple((le_u16, le_u32, le_u16, le_i16, le_i16, le_i16)))?;
            Command::PlaySnd2D {
                entry: Sound2DEntry {
                    id: 0,
                    slot,
                    frequency,
                    volume,
                    x,
                    y,
                    angle,
                },
            }
        }
        Opcode::Set2DPos => Command::Set2DPos {
            listener: fields(opcode, buf, 8, listener)?,
        },
        Opcode::Set2DDistFactor => Command::Set2DDistFactor {
            factor: fields(opcode, buf, 6, le_f32)?,
        },
        Opcode::Play3DSounds
        | Opcode::Set3DPos
        | Opcode::PlaySnd3D
        | Opcode::Set3DFacts
        | Opcode::SetEAX
        | Opcode::CDInit
        | Opcode::CDFree
        | Opcode::GetTracks
        | Opcode::GetTrackLength
        | Opcode::CDPlay => Command::Unsupported(opcode),
    };
    Ok(command)
}
