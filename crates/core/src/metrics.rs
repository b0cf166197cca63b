//! Helvetica text metrics.
//!
//! The persistence path inserts text with the Type1 Helvetica base font, so
//! its AFM advance widths are the authoritative source for extent
//! calculations. Widths are in thousandths of an em for ASCII 32..=126.

/// Ascender height as a fraction of the font size.
pub const ASCENT: f32 = 0.718;

/// Descender depth as a fraction of the font size (positive).
pub const DESCENT: f32 = 0.207;

/// Line box leading on top of ascent + descent.
const LEADING: f32 = 0.075;

/// Width used for codepoints outside the table.
const FALLBACK_WIDTH: u16 = 556;

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, // space ! " # $ % & ' ( )
    389, 584, 278, 333, 278, 278, 556, 556, 556, 556, // * + , - . / 0 1 2 3
    556, 556, 556, 556, 556, 556, 278, 278, 584, 584, // 4 5 6 7 8 9 : ; < =
    584, 556, 1015, 667, 667, 722, 722, 667, 611, 778, // > ? @ A B C D E F G
    722, 278, 500, 667, 556, 833, 722, 778, 667, 778, // H I J K L M N O P Q
    722, 667, 611, 722, 667, 944, 667, 667, 611, 278, // R S T U V W X Y Z [
    278, 278, 469, 556, 333, 556, 556, 500, 556, 556, // \ ] ^ _ ` a b c d e
    278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // f g h i j k l m n o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, // p q r s t u v w x y
    500, 334, 260, 334, 584,                          // z { | } ~
];

/// Advance width of one character at `font_size`.
pub fn advance_width(ch: char, font_size: f32) -> f32 {
    let code = ch as u32;
    let thousandths = if (32..=126).contains(&code) {
        HELVETICA_WIDTHS[(code - 32) as usize]
    } else {
        FALLBACK_WIDTH
    };
    f32::from(thousandths) / 1000.0 * font_size
}

/// Advance width of a whole run at `font_size`.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    text.chars().map(|ch| advance_width(ch, font_size)).sum()
}

/// Height of a single-line text box at `font_size`.
pub fn line_height(font_size: f32) -> f32 {
    (ASCENT + DESCENT + LEADING) * font_size
}
