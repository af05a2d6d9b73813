//! Reduces arbitrary Unicode to the ASCII subset the built-in fonts cover.

/// Replacement for a single character, if one is known.
fn substitute(c: char) -> Option<&'static str> {
    let s = match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{00B4}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{00AB}' | '\u{00BB}' => "\"",
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2212}' => "-",
        '\u{2014}' | '\u{2015}' => "--",
        '\u{2026}' => "...",
        '\u{2022}' | '\u{2023}' | '\u{25E6}' | '\u{2043}' | '\u{00B7}' | '\u{2219}' => "-",
        '\u{25AA}' | '\u{25CF}' | '\u{25A0}' => "*",
        '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2007}' | '\u{2009}' | '\u{202F}' => " ",
        '\u{2192}' | '\u{27F6}' => "->",
        '\u{2190}' | '\u{27F5}' => "<-",
        '\u{2194}' => "<->",
        '\u{21D2}' => "=>",
        '\u{21D0}' => "<=",
        '\u{00A9}' => "(c)",
        '\u{00AE}' => "(R)",
        '\u{2122}' => "(TM)",
        '\u{2264}' => "<=",
        '\u{2265}' => ">=",
        '\u{2260}' => "!=",
        '\u{2248}' => "~",
        '\u{00B1}' => "+/-",
        '\u{00D7}' => "x",
        '\u{00F7}' => "/",
        '\u{00B0}' => " deg",
        '\u{2713}' | '\u{2714}' => "[x]",
        '\u{2717}' | '\u{2718}' => "[ ]",
        '\u{20AC}' => "EUR",
        '\u{00A3}' => "GBP",
        '\u{00A7}' => "S.",
        '\u{00BD}' => "1/2",
        '\u{00BC}' => "1/4",
        '\u{00BE}' => "3/4",
        '\u{00DF}' => "ss",
        '\u{00E6}' => "ae",
        '\u{00C6}' => "AE",
        '\u{0153}' => "oe",
        '\u{0152}' => "OE",
        '\u{00F8}' => "o",
        '\u{00D8}' => "O",
        '\u{0142}' => "l",
        '\u{0141}' => "L",
        _ => return fold_latin(c),
    };
    Some(s)
}

/// Strip diacritics from common Latin-1 and Latin Extended-A letters.
fn fold_latin(c: char) -> Option<&'static str> {
    let s = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
        'ç' | 'ć' | 'č' => "c",
        'Ç' | 'Ć' | 'Č' => "C",
        'ď' | 'đ' => "d",
        'Ď' | 'Đ' => "D",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => "E",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' => "I",
        'ñ' | 'ń' | 'ň' => "n",
        'Ñ' | 'Ń' | 'Ň' => "N",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ō' | 'ő' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ō' | 'Ő' => "O",
        'ř' => "r",
        'Ř' => "R",
        'ś' | 'š' | 'ş' => "s",
        'Ś' | 'Š' | 'Ş' => "S",
        'ť' | 'ţ' => "t",
        'Ť' | 'Ţ' => "T",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' | 'Ÿ' => "Y",
        'ź' | 'ż' | 'ž' => "z",
        'Ź' | 'Ż' | 'Ž' => "Z",
        _ => return None,
    };
    Some(s)
}

/// Make `text` safe for a WinAnsi-encoded standard font.
///
/// Tabs become four spaces, other control and zero-width characters are
/// dropped, known symbols are substituted and anything left becomes `?`.
/// Newlines are kept so callers can split on them.
pub fn to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push('\n'),
            '\t' => out.push_str("    "),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}' => {}
            c if c.is_control() => {}
            c if c.is_ascii() => out.push(c),
            c => out.push_str(substitute(c).unwrap_or("?")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_typographic_punctuation() {
        assert_eq!(
            to_ascii("\u{201C}Don\u{2019}t\u{201D} \u{2014} wait\u{2026}"),
            "\"Don't\" -- wait..."
        );
        assert_eq!(to_ascii("a \u{2192} b \u{2264} c"), "a -> b <= c");
        assert_eq!(to_ascii("Acme\u{2122} \u{00A9} 2024"), "Acme(TM) (c) 2024");
    }

    #[test]
    fn folds_accents_and_marks_unknowns() {
        assert_eq!(to_ascii("Café Zürich"), "Cafe Zurich");
        assert_eq!(to_ascii("日本"), "??");
        assert_eq!(to_ascii("ok \u{1F600}"), "ok ?");
    }

    #[test]
    fn handles_whitespace_and_invisible_characters() {
        assert_eq!(to_ascii("a\tb"), "a    b");
        assert_eq!(to_ascii("zero\u{200B}width\r"), "zerowidth");
        assert_eq!(to_ascii("line1\nline2"), "line1\nline2");
        assert_eq!(to_ascii("non\u{00A0}breaking"), "non breaking");
    }
}
