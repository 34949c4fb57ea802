//! Text preparation for form fields encoded with WinAnsi (PDF standard Latin).

/// Fallback for characters that survive transliteration but have no WinAnsi code.
const REPLACEMENT: char = '?';

/// Transliterate diacritics that the field encoding cannot carry.
///
/// Romanian letters are always folded to ASCII (both the comma-below and the
/// legacy cedilla forms), matching how the templates are authored. Other
/// Latin letters outside WinAnsi are folded to their base letter; anything
/// still unencodable becomes `?`.
pub fn normalize_field_text(input: &str) -> String {
    input
        .chars()
        .map(|c| match transliterate(c) {
            Some(folded) => folded,
            None if win_ansi_byte(c).is_some() => c,
            None => REPLACEMENT,
        })
        .collect()
}

fn transliterate(c: char) -> Option<char> {
    let folded = match c {
        '\t' | '\n' | '\r' => ' ',
        'ă' | 'â' => 'a',
        'Ă' | 'Â' => 'A',
        'î' => 'i',
        'Î' => 'I',
        'ș' | 'ş' => 's',
        'Ș' | 'Ş' => 'S',
        'ț' | 'ţ' => 't',
        'Ț' | 'Ţ' => 'T',
        'ą' | 'ā' => 'a',
        'Ą' | 'Ā' => 'A',
        'ć' | 'č' => 'c',
        'Ć' | 'Č' => 'C',
        'ď' | 'đ' => 'd',
        'Ď' | 'Đ' => 'D',
        'ę' | 'ě' | 'ē' => 'e',
        'Ę' | 'Ě' | 'Ē' => 'E',
        'ğ' => 'g',
        'Ğ' => 'G',
        'ı' | 'ī' => 'i',
        'İ' | 'Ī' => 'I',
        'ł' | 'ľ' | 'ĺ' => 'l',
        'Ł' | 'Ľ' | 'Ĺ' => 'L',
        'ń' | 'ň' => 'n',
        'Ń' | 'Ň' => 'N',
        'ő' | 'ō' => 'o',
        'Ő' | 'Ō' => 'O',
        'ř' | 'ŕ' => 'r',
        'Ř' | 'Ŕ' => 'R',
        'ś' => 's',
        'Ś' => 'S',
        'ť' => 't',
        'Ť' => 'T',
        'ű' | 'ů' | 'ū' => 'u',
        'Ű' | 'Ů' | 'Ū' => 'U',
        'ź' | 'ż' => 'z',
        'Ź' | 'Ż' => 'Z',
        _ => return None,
    };
    Some(folded)
}

/// WinAnsi code point for `c`, if it has one.
pub fn win_ansi_byte(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x20..=0x7E => Some(code as u8),
        0xA0..=0xFF => Some(code as u8),
        _ => match c {
            '€' => Some(0x80),
            '‚' => Some(0x82),
            'ƒ' => Some(0x83),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '†' => Some(0x86),
            '‡' => Some(0x87),
            'ˆ' => Some(0x88),
            '‰' => Some(0x89),
            'Š' => Some(0x8A),
            '‹' => Some(0x8B),
            'Œ' => Some(0x8C),
            'Ž' => Some(0x8E),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            '˜' => Some(0x98),
            '™' => Some(0x99),
            'š' => Some(0x9A),
            '›' => Some(0x9B),
            'œ' => Some(0x9C),
            'ž' => Some(0x9E),
            'Ÿ' => Some(0x9F),
            _ => None,
        },
    }
}

/// Encode already-normalized text as WinAnsi bytes.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| win_ansi_byte(c).unwrap_or(REPLACEMENT as u8))
        .collect()
}

/// Escape WinAnsi bytes for use inside a PDF literal string in a content stream.
pub(crate) fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 8);
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' | b'\n' => out.push(b' '),
            _ => out.push(b),
        }
    }
    out
}
