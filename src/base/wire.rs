//! Consuming data in wire format.

use core::fmt;
use octseq::parse::ShortInput;

//------------ ParseError ----------------------------------------------------

/// An error happened while parsing data.
///
/// Any attempt to read beyond the end of a message ends up as
/// [`ParseError::ShortInput`]. Data that is long enough but makes no sense
/// is reported as a [`FormError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// An attempt was made to go beyond the end of the parser.
    ShortInput,

    /// A formatting error occurred.
    Form(FormError),
}

impl ParseError {
    /// Creates a new parse error as a form error with the given message.
    pub fn form_error(msg: &'static str) -> Self {
        FormError::new(msg).into()
    }
}

//--- From

impl From<ShortInput> for ParseError {
    fn from(_: ShortInput) -> Self {
        ParseError::ShortInput
    }
}

impl From<FormError> for ParseError {
    fn from(err: FormError) -> Self {
        ParseError::Form(err)
    }
}

//--- Display and Error

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseError::ShortInput => f.write_str("unexpected end of input"),
            ParseError::Form(ref err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ParseError {}

//------------ FormError -----------------------------------------------------

/// A formatting error occured.
///
/// For diagnostics, the error carries a static string describing what was
/// wrong with the data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormError(&'static str);

impl FormError {
    /// Creates a new form error value with the given diagnostics string.
    pub fn new(msg: &'static str) -> Self {
        FormError(msg)
    }
}

//--- Display and Error

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for FormError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use octseq::parse::Parser;

    #[test]
    fn short_input_converts() {
        let data: &[u8] = b"\x01";
        let mut parser = Parser::from_ref(data);
        let err: ParseError = parser.parse_u16_be().unwrap_err().into();
        assert_eq!(err, ParseError::ShortInput);
        assert_eq!(format!("{}", err), "unexpected end of input");
    }

    #[test]
    fn form_error_display() {
        let err = ParseError::form_error("bad label type");
        assert_eq!(format!("{}", err), "bad label type");
    }
}
