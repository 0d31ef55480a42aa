//! Expression (LED face) types.

use std::fmt;

use crate::error::FrameError;

/// Number of columns on the LED matrix.
pub const MATRIX_WIDTH: u32 = 15;

/// Number of rows on the LED matrix.
pub const MATRIX_HEIGHT: u32 = 7;

/// Bits of a row that map to matrix columns.
const ROW_MASK: u16 = (1 << MATRIX_WIDTH) - 1;

/// Addressable expression slots on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExpressionIndex {
    /// Resting face.
    Default = 0,
    /// Face shown briefly while blinking.
    Blink = 1,
    /// Resting face while a friend is nearby.
    Friend = 2,
    /// Blinking face while a friend is nearby.
    FriendBlink = 3,
}

impl ExpressionIndex {
    /// All slots, in wire order.
    pub const ALL: [Self; 4] = [Self::Default, Self::Blink, Self::Friend, Self::FriendBlink];

    /// Attempts to parse a slot from its wire byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Default),
            1 => Some(Self::Blink),
            2 => Some(Self::Friend),
            3 => Some(Self::FriendBlink),
            _ => None,
        }
    }

    /// Returns the expression the firmware ships with for this slot.
    #[must_use]
    pub const fn factory_expression(self) -> Expression {
        match self {
            Self::Default | Self::Friend => Expression::from_rows([
                0b000_0000_0000_0000,
                0b001_1000_0000_1100,
                0b010_0100_0001_0010,
                0b010_0100_0001_0010,
                0b001_1001_0100_1100,
                0b000_0001_1100_0000,
                0b000_0000_0000_0000,
            ]),
            Self::Blink | Self::FriendBlink => Expression::from_rows([
                0b000_0000_0000_0000,
                0b000_0000_0000_0000,
                0b011_1100_0001_1110,
                0b000_0000_0000_0000,
                0b000_0001_0100_0000,
                0b000_0001_1100_0000,
                0b000_0000_0000_0000,
            ]),
        }
    }
}

impl From<ExpressionIndex> for u8 {
    fn from(index: ExpressionIndex) -> Self {
        index as Self
    }
}

impl TryFrom<u8> for ExpressionIndex {
    type Error = FrameError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_byte(byte).ok_or(FrameError::InvalidExpressionIndex(byte))
    }
}

/// A displayable on/off pattern for the 15×7 LED matrix.
///
/// Each row is a bitmask where bit `x` is the pixel in column `x`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Expression {
    rows: [u16; MATRIX_HEIGHT as usize],
}

impl Expression {
    /// Creates an expression with every pixel off.
    #[must_use]
    pub const fn blank() -> Self {
        Self {
            rows: [0; MATRIX_HEIGHT as usize],
        }
    }

    /// Creates an expression from raw row bitmasks.
    ///
    /// No validation is done here; see [`Expression::is_valid`].
    #[must_use]
    pub const fn from_rows(rows: [u16; MATRIX_HEIGHT as usize]) -> Self {
        Self { rows }
    }

    /// Returns the raw row bitmasks, top row first.
    #[must_use]
    pub const fn rows(&self) -> [u16; MATRIX_HEIGHT as usize] {
        self.rows
    }

    /// Turns the pixel at `(x, y)` on or off.
    ///
    /// Coordinates outside the matrix are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, on: bool) {
        if x < MATRIX_WIDTH && y < MATRIX_HEIGHT {
            if on {
                self.rows[y as usize] |= 1 << x;
            } else {
                self.rows[y as usize] &= !(1 << x);
            }
        }
    }

    /// Returns whether the pixel at `(x, y)` is on.
    ///
    /// Coordinates outside the matrix read as off.
    #[must_use]
    pub fn get_pixel(&self, x: u32, y: u32) -> bool {
        x < MATRIX_WIDTH && y < MATRIX_HEIGHT && (self.rows[y as usize] & (1 << x)) != 0
    }

    /// Returns the number of lit pixels.
    #[must_use]
    pub fn lit_pixels(&self) -> u32 {
        self.rows.iter().map(|row| row.count_ones()).sum()
    }

    /// Checks that no row sets bits beyond the matrix width.
    pub fn validate(&self) -> Result<(), FrameError> {
        match self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| *row & !ROW_MASK != 0)
        {
            Some((row, &bits)) => Err(FrameError::InvalidExpressionRow { row, bits }),
            None => Ok(()),
        }
    }

    /// Returns true if every row fits the matrix width.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..MATRIX_HEIGHT {
            for x in 0..MATRIX_WIDTH {
                f.write_str(if self.get_pixel(x, y) { "#" } else { "." })?;
            }
            if y + 1 < MATRIX_HEIGHT {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_pixel() {
        let mut expression = Expression::blank();
        expression.set_pixel(3, 2, true);
        expression.set_pixel(14, 6, true);

        assert!(expression.get_pixel(3, 2));
        assert!(expression.get_pixel(14, 6));
        assert!(!expression.get_pixel(2, 3));
        assert_eq!(expression.rows()[2], 1 << 3);
        assert_eq!(expression.lit_pixels(), 2);

        expression.set_pixel(3, 2, false);
        assert!(!expression.get_pixel(3, 2));
    }

    #[test]
    fn test_out_of_range_pixels_ignored() {
        let mut expression = Expression::blank();
        expression.set_pixel(15, 0, true);
        expression.set_pixel(0, 7, true);

        assert_eq!(expression, Expression::blank());
        assert!(!expression.get_pixel(15, 0));
        assert!(!expression.get_pixel(100, 100));
    }

    #[test]
    fn test_validate_rejects_sixteenth_column() {
        let mut rows = [0u16; 7];
        rows[4] = 0x8001;
        let expression = Expression::from_rows(rows);

        assert_eq!(
            expression.validate(),
            Err(FrameError::InvalidExpressionRow {
                row: 4,
                bits: 0x8001
            })
        );
        assert!(!expression.is_valid());
    }

    #[test]
    fn test_factory_expressions_are_valid() {
        for index in ExpressionIndex::ALL {
            let expression = index.factory_expression();
            assert!(expression.is_valid(), "{index:?}");
            assert!(expression.lit_pixels() > 0, "{index:?}");
        }
        assert_eq!(
            ExpressionIndex::Default.factory_expression(),
            ExpressionIndex::Friend.factory_expression()
        );
    }

    #[test]
    fn test_expression_index_from_byte() {
        assert_eq!(ExpressionIndex::from_byte(0), Some(ExpressionIndex::Default));
        assert_eq!(
            ExpressionIndex::from_byte(3),
            Some(ExpressionIndex::FriendBlink)
        );
        assert_eq!(ExpressionIndex::from_byte(4), None);
        assert_eq!(
            ExpressionIndex::try_from(9),
            Err(FrameError::InvalidExpressionIndex(9))
        );
        let byte: u8 = ExpressionIndex::Blink.into();
        assert_eq!(byte, 1);
    }

    #[test]
    fn test_display_renders_grid() {
        let mut expression = Expression::blank();
        expression.set_pixel(0, 0, true);
        let text = expression.to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "#..............");
        assert_eq!(lines[6], "...............");
    }
}
