use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::Display;

/// Error codes of core protocol. Extension errors start at extension's `first_error`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
pub enum ErrorCode {
    Request = 1,
    Value = 2,
    Window = 3,
    Pixmap = 4,
    Atom = 5,
    Cursor = 6,
    Font = 7,
    Match = 8,
    Drawable = 9,
    Access = 10,
    Alloc = 11,
    Colormap = 12,
    GContext = 13,
    IDChoice = 14,
    Name = 15,
    Length = 16,
    Implementation = 17,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::ErrorCode;

    #[test]
    fn test_error_code() {
        assert_eq!(ErrorCode::try_from(3u8).unwrap(), ErrorCode::Window);
        assert_eq!(u8::from(ErrorCode::Implementation), 17);
        assert!(ErrorCode::try_from(0u8).is_err());
        assert!(ErrorCode::try_from(18u8).is_err());
    }
}
