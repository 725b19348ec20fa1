//! Error and warning types.

use nom::IResult;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::result;
use thiserror::Error;

/// Our standard result type.
pub type Result<T, E = Error> = result::Result<T, E>;

/// Structural failures which abort loading or writing the current stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Our input data ended sooner than we expected.
    #[error("input ended unexpectedly")]
    IncompleteInput,

    /// We have leftover input that we didn't expect.
    #[error("unexpected extra input")]
    UnexpectedInput,

    /// We could not parse a value.
    #[error("could not parse: {message}")]
    Parse {
        /// What went wrong.
        message: String,
    },

    /// We were unable to find a required key in an `*.idx` file.
    #[error("could not find required key {key:?}")]
    MissingKey {
        /// The name of the missing key.
        key: &'static str,
    },

    /// A file or packet did not start with the bytes we expected.
    #[error("bad magic bytes in {what}")]
    BadMagic {
        /// The kind of data we were looking at.
        what: &'static str,
    },

    /// A subtitle frame violates one of its invariants.
    #[error("invalid subtitle frame: {message}")]
    InvalidFrame {
        /// What went wrong.
        message: String,
    },

    /// A palette definition could not be used.
    #[error("invalid palette: {message}")]
    InvalidPalette {
        /// What went wrong.
        message: String,
    },

    /// A bitmap uses more colors than the target format allows.
    #[error("bitmap uses color index {index}, but only {limit} colors are allowed")]
    TooManyColors {
        /// The offending color index.
        index: u8,
        /// The number of colors allowed.
        limit: usize,
    },

    /// An encoded image does not fit in the fields of its container.
    #[error("encoded image is too large: {message}")]
    ImageTooLarge {
        /// What overflowed.
        message: String,
    },

    /// We could not read a file.
    #[error("could not read {path:?}")]
    ReadFile {
        /// The file we were reading.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// We could not write a file.
    #[error("could not write {path:?}")]
    WriteFile {
        /// The file we were writing.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// A numeric conversion overflowed.
    #[error("numeric value out of range: {0}")]
    Cast(#[from] cast::Error),

    /// Some other I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The conversion was cancelled by the caller.
    #[error("conversion cancelled")]
    Cancelled,
}

impl Error {
    /// Build an `Error::Parse` from any displayable message.
    pub(crate) fn parse<S: fmt::Display>(message: S) -> Error {
        Error::Parse {
            message: message.to_string(),
        }
    }

    /// Build an `Error::InvalidFrame` from any displayable message.
    pub(crate) fn invalid_frame<S: fmt::Display>(message: S) -> Error {
        Error::InvalidFrame {
            message: message.to_string(),
        }
    }

    /// Build an `Error::InvalidPalette` from any displayable message.
    pub(crate) fn invalid_palette<S: fmt::Display>(message: S) -> Error {
        Error::InvalidPalette {
            message: message.to_string(),
        }
    }

    /// Build an `Error::ImageTooLarge` from any displayable message.
    pub(crate) fn too_large<S: fmt::Display>(message: S) -> Error {
        Error::ImageTooLarge {
            message: message.to_string(),
        }
    }
}

/// Convert `nom` results into our own errors.
pub(crate) trait IResultExt<I, O> {
    fn to_subpic_result(self) -> Result<O>;
}

impl<I: nom::InputLength, O, E: fmt::Debug> IResultExt<I, O> for IResult<I, O, E> {
    fn to_subpic_result(self) -> Result<O> {
        match self {
            Ok((rest, val)) => {
                if rest.input_len() == 0 {
                    Ok(val)
                } else {
                    Err(Error::UnexpectedInput)
                }
            }
            Err(nom::Err::Incomplete(_)) => Err(Error::IncompleteInput),
            Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
                Err(Error::parse(format!("{:?}", err)))
            }
        }
    }
}

/// Recoverable stream anomalies collected while decoding or encoding.
///
/// Each warning is logged as it happens, and the whole set can be reported
/// once a batch operation finishes.
#[derive(Clone, Debug, Default)]
pub struct Warnings {
    messages: Vec<String>,
}

impl Warnings {
    /// Create an empty accumulator.
    pub fn new() -> Warnings {
        Warnings::default()
    }

    /// Record a warning.
    pub fn warn<S: Into<String>>(&mut self, message: S) {
        let message = message.into();
        warn!("{}", message);
        self.messages.push(message);
    }

    /// How many warnings have we seen?
    pub fn count(&self) -> usize {
        self.messages.len()
    }

    /// Did everything decode cleanly?
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The individual warning messages, oldest first.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Move all the warnings from `other` into `self`.
    pub fn append(&mut self, other: &mut Warnings) {
        self.messages.append(&mut other.messages);
    }
}

#[test]
fn nom_errors_map_to_our_errors() {
    use nom::bytes::complete::tag;

    let parsed: IResult<&[u8], &[u8]> = tag(&b"SP"[..])(&b"SPxx"[..]);
    match parsed.to_subpic_result() {
        Err(Error::UnexpectedInput) => {}
        other => panic!("unexpected result {:?}", other),
    }

    let parsed: IResult<&[u8], &[u8]> = tag(&b"SP"[..])(&b"PG"[..]);
    match parsed.to_subpic_result() {
        Err(Error::Parse { .. }) => {}
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn warnings_accumulate() {
    let mut first = Warnings::new();
    first.warn("one");
    let mut second = Warnings::new();
    second.warn("two");
    second.warn("three");
    first.append(&mut second);
    assert_eq!(first.count(), 3);
    assert!(second.is_empty());
    assert_eq!(first.messages()[2], "three");
}

#[test]
fn numeric_overflow_becomes_cast_error() {
    fn narrow(n: usize) -> Result<u8> {
        Ok(cast::u8(n)?)
    }

    assert_eq!(narrow(200).unwrap(), 200);
    let err = narrow(300).unwrap_err();
    match &err {
        Error::Cast(_) => {}
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.to_string().starts_with("numeric value out of range"));
    assert!(std::error::Error::source(&err).is_some());
}
