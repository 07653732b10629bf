//! NMEA 0183 sentence parsing
//!
//! Sentences look like `$GPGGA,123519,4807.038,N,...*47`: a `$`, the talker
//! and sentence type, comma separated fields and an optional checksum, the
//! XOR of all characters between `$` and `*`.

use core::str::FromStr;

use heapless::Vec;

/// Longest sentence allowed by NMEA 0183, including `$` and `\r\n`
pub const MAX_SENTENCE_LEN: usize = 82;

/// Most fields a sentence may have
pub const MAX_FIELDS: usize = 24;

/// Errors found while parsing a sentence
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Not a sentence: no leading `$`, no address or a malformed checksum
    Format,

    /// Checksum does not match the sentence
    Checksum {
        /// Checksum transmitted with the sentence
        expected: u8,
        /// Checksum computed over the sentence
        computed: u8,
    },

    /// More than [`MAX_FIELDS`] fields
    TooManyFields,

    /// A field could not be parsed
    InvalidField {
        /// Index of the field, as passed to [`Sentence::field`]
        index: usize,
    },

    /// The sentence has another type than requested
    UnexpectedSentence,
}

/// XOR of all bytes of `body`, the characters between `$` and `*`
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, byte| acc ^ byte)
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

/// A syntactically valid sentence, split into fields
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sentence<'a> {
    /// Talker ID, e.g. `GP` or `GN`, or `P` for proprietary sentences
    pub talker: &'a str,
    /// Sentence type, e.g. `GGA`, or the rest of a proprietary address
    pub kind: &'a str,
    fields: Vec<&'a str, MAX_FIELDS>,
}

impl<'a> Sentence<'a> {
    /// Parse and validate one line
    ///
    /// Trailing `\r\n` is ignored. The checksum is verified if present.
    pub fn parse(line: &'a str) -> Result<Self, Error> {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = line.strip_prefix('$').ok_or(Error::Format)?;

        let body = match line.split_once('*') {
            Some((body, hex)) => {
                let hex = hex.as_bytes();
                if hex.len() != 2 {
                    return Err(Error::Format);
                }
                let high = hex_digit(hex[0]).ok_or(Error::Format)?;
                let low = hex_digit(hex[1]).ok_or(Error::Format)?;

                let expected = (high << 4) | low;
                let computed = checksum(body);
                if expected != computed {
                    return Err(Error::Checksum { expected, computed });
                }
                body
            }
            None => line,
        };

        let mut parts = body.split(',');
        let address = parts.next().ok_or(Error::Format)?;
        if !address.is_ascii() || address.len() < 2 {
            return Err(Error::Format);
        }
        let (talker, kind) = if address.starts_with('P') {
            address.split_at(1)
        } else if address.len() >= 5 {
            address.split_at(2)
        } else {
            return Err(Error::Format);
        };

        let mut fields = Vec::new();
        for field in parts {
            fields.push(field).map_err(|_| Error::TooManyFields)?;
        }

        Ok(Sentence {
            talker,
            kind,
            fields,
        })
    }

    /// Number of fields after the address
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the sentence has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The field at `index`, counted from the first field after the address
    ///
    /// Returns `None` for missing and empty fields.
    pub fn field(&self, index: usize) -> Option<&'a str> {
        self.fields.get(index).copied().filter(|field| !field.is_empty())
    }

    /// Parse the field at `index`
    pub fn parse_field<T>(&self, index: usize) -> Result<Option<T>, Error>
    where
        T: FromStr,
    {
        self.field(index)
            .map(|field| field.parse().map_err(|_| Error::InvalidField { index }))
            .transpose()
    }

    fn expect_kind(&self, kind: &str) -> Result<(), Error> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(Error::UnexpectedSentence)
        }
    }

    fn time(&self, index: usize) -> Result<Option<Time>, Error> {
        self.field(index)
            .map(|field| Time::parse(field).ok_or(Error::InvalidField { index }))
            .transpose()
    }

    fn coordinate(&self, index: usize) -> Result<Option<f64>, Error> {
        let (Some(value), Some(hemisphere)) = (self.field(index), self.field(index + 1)) else {
            return Ok(None);
        };

        let degrees = parse_coordinate(value).ok_or(Error::InvalidField { index })?;
        match hemisphere {
            "N" | "E" => Ok(Some(degrees)),
            "S" | "W" => Ok(Some(-degrees)),
            _ => Err(Error::InvalidField { index: index + 1 }),
        }
    }

    fn status(&self, index: usize) -> Result<bool, Error> {
        match self.field(index) {
            Some("A") => Ok(true),
            Some("V") | None => Ok(false),
            Some(_) => Err(Error::InvalidField { index }),
        }
    }
}

/// Convert `dddmm.mmmm` to decimal degrees
fn parse_coordinate(value: &str) -> Option<f64> {
    if !value.is_ascii() {
        return None;
    }
    let integer_len = value.find('.').unwrap_or(value.len());
    if integer_len < 2 {
        return None;
    }
    let (degrees, minutes) = value.split_at(integer_len - 2);

    let degrees = if degrees.is_empty() {
        0
    } else {
        degrees.parse::<u16>().ok()?
    };
    let minutes = minutes.parse::<f64>().ok()?;
    if !(0.0..60.0).contains(&minutes) {
        return None;
    }

    Some(degrees as f64 + minutes / 60.0)
}

fn two_digits(digits: &str) -> Option<u8> {
    if digits.len() == 2 && digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// UTC time of day
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Time {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub millis: u16,
}

impl Time {
    /// Parse `hhmmss` or `hhmmss.sss`
    pub fn parse(field: &str) -> Option<Self> {
        let (whole, fraction) = field.split_once('.').unwrap_or((field, ""));
        if whole.len() != 6 || !whole.is_ascii() {
            return None;
        }

        let hours = two_digits(&whole[0..2])?;
        let minutes = two_digits(&whole[2..4])?;
        let seconds = two_digits(&whole[4..6])?;
        if hours > 23 || minutes > 59 || seconds > 60 {
            return None;
        }

        let mut millis = 0;
        let mut scale = 100;
        for byte in fraction.bytes().take(3) {
            if !byte.is_ascii_digit() {
                return None;
            }
            millis += (byte - b'0') as u16 * scale;
            scale /= 10;
        }

        Some(Time {
            hours,
            minutes,
            seconds,
            millis,
        })
    }
}

/// UTC date
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Date {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

impl Date {
    /// Parse `ddmmyy`, years are taken to be 20yy
    pub fn parse(field: &str) -> Option<Self> {
        if field.len() != 6 || !field.is_ascii() {
            return None;
        }

        let day = two_digits(&field[0..2])?;
        let month = two_digits(&field[2..4])?;
        let year = two_digits(&field[4..6])?;
        if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
            return None;
        }

        Some(Date {
            day,
            month,
            year: 2000 + year as u16,
        })
    }
}

/// GGA fix quality
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FixQuality {
    #[default]
    Invalid,
    Gps,
    Dgps,
    Pps,
    Rtk,
    FloatRtk,
    Estimated,
    Manual,
    Simulation,
}

impl FixQuality {
    fn from_digit(value: u8) -> Option<Self> {
        Some(match value {
            0 => FixQuality::Invalid,
            1 => FixQuality::Gps,
            2 => FixQuality::Dgps,
            3 => FixQuality::Pps,
            4 => FixQuality::Rtk,
            5 => FixQuality::FloatRtk,
            6 => FixQuality::Estimated,
            7 => FixQuality::Manual,
            8 => FixQuality::Simulation,
            _ => return None,
        })
    }
}

/// Global positioning system fix data
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gga {
    pub time: Option<Time>,
    /// Degrees, north positive
    pub latitude: Option<f64>,
    /// Degrees, east positive
    pub longitude: Option<f64>,
    pub fix_quality: FixQuality,
    /// Satellites in use
    pub satellites: u8,
    /// Horizontal dilution of precision
    pub hdop: Option<f32>,
    /// Altitude above mean sea level in meters
    pub altitude_m: Option<f32>,
}

impl Gga {
    /// Whether the receiver reports a position fix
    pub fn has_fix(&self) -> bool {
        self.fix_quality != FixQuality::Invalid
    }
}

impl<'a> TryFrom<&Sentence<'a>> for Gga {
    type Error = Error;

    fn try_from(sentence: &Sentence<'a>) -> Result<Self, Error> {
        sentence.expect_kind("GGA")?;

        let fix_quality = match sentence.parse_field::<u8>(5)? {
            Some(value) => {
                FixQuality::from_digit(value).ok_or(Error::InvalidField { index: 5 })?
            }
            None => FixQuality::Invalid,
        };

        Ok(Gga {
            time: sentence.time(0)?,
            latitude: sentence.coordinate(1)?,
            longitude: sentence.coordinate(3)?,
            fix_quality,
            satellites: sentence.parse_field(6)?.unwrap_or(0),
            hdop: sentence.parse_field(7)?,
            altitude_m: sentence.parse_field(8)?,
        })
    }
}

/// Recommended minimum navigation data
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rmc {
    pub time: Option<Time>,
    /// Status `A`: the data is valid
    pub valid: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Speed over ground in knots
    pub speed_knots: Option<f32>,
    /// Course over ground in degrees true
    pub course_deg: Option<f32>,
    pub date: Option<Date>,
}

impl<'a> TryFrom<&Sentence<'a>> for Rmc {
    type Error = Error;

    fn try_from(sentence: &Sentence<'a>) -> Result<Self, Error> {
        sentence.expect_kind("RMC")?;

        let date = sentence
            .field(8)
            .map(|field| Date::parse(field).ok_or(Error::InvalidField { index: 8 }))
            .transpose()?;

        Ok(Rmc {
            time: sentence.time(0)?,
            valid: sentence.status(1)?,
            latitude: sentence.coordinate(2)?,
            longitude: sentence.coordinate(4)?,
            speed_knots: sentence.parse_field(6)?,
            course_deg: sentence.parse_field(7)?,
            date,
        })
    }
}

/// Geographic position
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gll {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub time: Option<Time>,
    /// Status `A`: the data is valid
    pub valid: bool,
}

impl<'a> TryFrom<&Sentence<'a>> for Gll {
    type Error = Error;

    fn try_from(sentence: &Sentence<'a>) -> Result<Self, Error> {
        sentence.expect_kind("GLL")?;

        Ok(Gll {
            latitude: sentence.coordinate(0)?,
            longitude: sentence.coordinate(2)?,
            time: sentence.time(4)?,
            valid: sentence.status(5)?,
        })
    }
}

/// Assembles sentences from a byte stream
///
/// Bytes before the first `$` are dropped. A `$` always starts a new
/// sentence, and lines longer than [`MAX_SENTENCE_LEN`] are discarded.
#[derive(Debug, Default)]
pub struct SentenceReader {
    line: Vec<u8, MAX_SENTENCE_LEN>,
    complete: bool,
}

impl SentenceReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte
    ///
    /// Returns the line, without `\r\n`, when `byte` completes it.
    pub fn push(&mut self, byte: u8) -> Option<&str> {
        if self.complete {
            self.line.clear();
            self.complete = false;
        }

        match byte {
            b'$' => {
                self.line.clear();
                // Can't fail on an empty buffer
                let _ = self.line.push(byte);
                None
            }
            _ if self.line.is_empty() => None,
            b'\n' => {
                if self.line.last() == Some(&b'\r') {
                    self.line.pop();
                }
                self.complete = true;
                core::str::from_utf8(&self.line).ok()
            }
            _ => {
                // Room for the `\n` is part of the limit
                if self.line.len() + 1 >= MAX_SENTENCE_LEN || self.line.push(byte).is_err() {
                    self.line.clear();
                }
                None
            }
        }
    }
}
