//! printf style rendering of engine log templates.
//!
//! The engine formats its messages with C conversion specifications. The
//! renderer understands the flags, width, precision and length modifiers of
//! `%d %i %u %o %x %X %c %s %p %f %F %e %E %g %G` and `%%`. A conversion it
//! cannot parse, or one without a matching argument, is copied to the output
//! verbatim. Rendering never fails.

use iobridge_sys::MAYA_LOG_BUF_LEN;

/// A single argument for a template conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(&'a str),
    Char(char),
    Ptr(usize),
}

macro_rules! arg_from {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(
            impl From<$t> for Arg<'_> {
                fn from(v: $t) -> Self {
                    Arg::$variant(v as $target)
                }
            }
        )*
    };
}

arg_from!(Int, i64, i8, i16, i32, i64, isize);
arg_from!(Uint, u64, u8, u16, u32, u64, usize);
arg_from!(Float, f64, f32, f64);

impl<'a> From<&'a str> for Arg<'a> {
    fn from(s: &'a str) -> Self {
        Arg::Str(s)
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(s: &'a String) -> Self {
        Arg::Str(s.as_str())
    }
}

impl From<char> for Arg<'_> {
    fn from(c: char) -> Self {
        Arg::Char(c)
    }
}

impl<T> From<*const T> for Arg<'_> {
    fn from(p: *const T) -> Self {
        Arg::Ptr(p as usize)
    }
}

impl<T> From<*mut T> for Arg<'_> {
    fn from(p: *mut T) -> Self {
        Arg::Ptr(p as usize)
    }
}

impl Arg<'_> {
    fn as_i64(&self) -> i64 {
        match *self {
            Arg::Int(v) => v,
            Arg::Uint(v) => v as i64,
            Arg::Float(v) => v as i64,
            Arg::Char(c) => c as i64,
            Arg::Ptr(p) => p as i64,
            Arg::Str(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

const CONVERSIONS: &[u8] = b"diouxXcspfFeEgG";
const DEFAULT_FLOAT_PRECISION: usize = 6;
/// Widths and precisions are capped here. A field this wide already fills
/// the log buffer, so the delivered text is the same as with the real value.
pub const MAX_FIELD: usize = MAYA_LOG_BUF_LEN;

#[derive(Debug, Default)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Render `template` with `args`, C `printf` style.
pub fn render(template: &str, args: &[Arg<'_>]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut args = args.iter();
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[.. pos]);
        let spec = &rest[pos ..];
        let (consumed, rendered) = conversion(spec, &mut args);
        match rendered {
            Some(text) => out.push_str(&text),
            None => out.push_str(&spec[.. consumed]),
        }
        rest = &spec[consumed ..];
    }

    out.push_str(rest);
    out
}

fn digits(b: &[u8]) -> (usize, usize) {
    let len = b.iter().take_while(|c| c.is_ascii_digit()).count();
    let value = b[.. len].iter().fold(0usize, |acc, c| {
        acc.saturating_mul(10).saturating_add((c - b'0') as usize)
    });
    (value, len)
}

/// Parses one conversion starting at the `%` in `s`. Returns the number of
/// bytes consumed and the rendered text, `None` meaning the consumed bytes are
/// to be copied verbatim. Everything up to the conversion character is ASCII,
/// so the consumed length always lands on a char boundary.
fn conversion<'a, 'b>(
    s: &str,
    args: &mut impl Iterator<Item = &'b Arg<'a>>,
) -> (usize, Option<String>)
where
    'a: 'b,
{
    let b = s.as_bytes();
    let mut i = 1;

    if b.get(i) == Some(&b'%') {
        return (2, Some("%".into()));
    }

    let mut spec = Spec::default();
    while let Some(&c) = b.get(i) {
        match c {
            b'-' => spec.left = true,
            b'+' => spec.plus = true,
            b' ' => spec.space = true,
            b'#' => spec.alt = true,
            b'0' => spec.zero = true,
            _ => break,
        }
        i += 1;
    }

    if b.get(i) == Some(&b'*') {
        i += 1;
        match args.next() {
            Some(a) => {
                let w = a.as_i64();
                if w < 0 {
                    spec.left = true;
                }
                spec.width = Some(w.unsigned_abs() as usize);
            }
            None => return (i, None),
        }
    } else {
        let (n, len) = digits(&b[i ..]);
        if len > 0 {
            spec.width = Some(n);
            i += len;
        }
    }

    if b.get(i) == Some(&b'.') {
        i += 1;
        if b.get(i) == Some(&b'*') {
            i += 1;
            match args.next() {
                Some(a) => {
                    let p = a.as_i64();
                    spec.precision = if p < 0 { None } else { Some(p as usize) };
                }
                None => return (i, None),
            }
        } else {
            let (n, len) = digits(&b[i ..]);
            spec.precision = Some(n);
            i += len;
        }
    }

    spec.width = spec.width.map(|w| w.min(MAX_FIELD));
    spec.precision = spec.precision.map(|p| p.min(MAX_FIELD));

    while let Some(&c) = b.get(i) {
        if matches!(c, b'h' | b'l' | b'L' | b'q' | b'j' | b'z' | b't') {
            i += 1;
        } else {
            break;
        }
    }

    let conv = match b.get(i) {
        Some(&c) if CONVERSIONS.contains(&c) => c,
        _ => return (i, None),
    };
    i += 1;

    let arg = match args.next() {
        Some(arg) => arg,
        None => return (i, None),
    };

    let text = match conv {
        b'd' | b'i' => signed(&spec, arg),
        b'u' | b'o' | b'x' | b'X' => unsigned(&spec, arg, conv),
        b'c' => character(&spec, arg),
        b's' => string(&spec, arg),
        b'p' => pointer(&spec, arg),
        _ => float(&spec, arg, conv),
    };

    (i, Some(text))
}

/// Pads `prefix` + `body` to the field width. Zero padding goes between the
/// prefix and the body.
fn pad(spec: &Spec, prefix: &str, body: &str, zero_ok: bool) -> String {
    let len = prefix.chars().count() + body.chars().count();
    let fill = spec.width.map_or(0, |w| w.saturating_sub(len));

    let mut out = String::with_capacity(len + fill);
    if spec.left {
        out.push_str(prefix);
        out.push_str(body);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if spec.zero && zero_ok {
        out.push_str(prefix);
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(body);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(prefix);
        out.push_str(body);
    }
    out
}

fn min_digits(spec: &Spec, digits: String) -> String {
    match spec.precision {
        Some(0) if digits == "0" => String::new(),
        Some(p) if digits.len() < p => {
            let mut out = "0".repeat(p - digits.len());
            out.push_str(&digits);
            out
        }
        _ => digits,
    }
}

fn sign(spec: &Spec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn signed(spec: &Spec, arg: &Arg<'_>) -> String {
    if let Arg::Str(s) = arg {
        return pad(spec, "", s, false);
    }
    let v = arg.as_i64();
    let digits = min_digits(spec, v.unsigned_abs().to_string());
    pad(spec, sign(spec, v < 0), &digits, spec.precision.is_none())
}

fn unsigned(spec: &Spec, arg: &Arg<'_>, conv: u8) -> String {
    if let Arg::Str(s) = arg {
        return pad(spec, "", s, false);
    }
    let v = arg.as_i64() as u64;
    let digits = match conv {
        b'o' => format!("{:o}", v),
        b'x' => format!("{:x}", v),
        b'X' => format!("{:X}", v),
        _ => v.to_string(),
    };
    let digits = min_digits(spec, digits);

    let prefix = match conv {
        b'x' if spec.alt && v != 0 => "0x",
        b'X' if spec.alt && v != 0 => "0X",
        b'o' if spec.alt && !digits.starts_with('0') => "0",
        _ => "",
    };

    pad(spec, prefix, &digits, spec.precision.is_none())
}

fn character(spec: &Spec, arg: &Arg<'_>) -> String {
    let c = match *arg {
        Arg::Char(c) => c,
        Arg::Str(s) => s.chars().next().unwrap_or('\0'),
        _ => (arg.as_i64() as u8) as char,
    };
    pad(spec, "", c.encode_utf8(&mut [0; 4]), false)
}

fn string(spec: &Spec, arg: &Arg<'_>) -> String {
    let owned;
    let s = match *arg {
        Arg::Str(s) => s,
        Arg::Int(v) => {
            owned = v.to_string();
            &owned
        }
        Arg::Uint(v) => {
            owned = v.to_string();
            &owned
        }
        Arg::Float(v) => {
            owned = v.to_string();
            &owned
        }
        Arg::Char(c) => {
            owned = c.to_string();
            &owned
        }
        Arg::Ptr(0) => "(null)",
        Arg::Ptr(p) => {
            owned = format!("{:#x}", p);
            &owned
        }
    };

    let s = match spec.precision {
        Some(p) if p < s.len() => {
            let mut end = p;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            &s[.. end]
        }
        _ => s,
    };

    pad(spec, "", s, false)
}

fn pointer(spec: &Spec, arg: &Arg<'_>) -> String {
    match *arg {
        Arg::Str(s) => pad(spec, "", s, false),
        _ => match arg.as_i64() as usize {
            0 => pad(spec, "", "(nil)", false),
            p => pad(spec, "0x", &format!("{:x}", p), false),
        },
    }
}

fn float(spec: &Spec, arg: &Arg<'_>, conv: u8) -> String {
    let v = match *arg {
        Arg::Float(v) => v,
        Arg::Uint(v) => v as f64,
        Arg::Str(s) => return pad(spec, "", s, false),
        _ => arg.as_i64() as f64,
    };

    let precision = spec.precision.unwrap_or(DEFAULT_FLOAT_PRECISION);
    let negative = v.is_sign_negative() && !v.is_nan();
    let magnitude = v.abs();

    let body = if magnitude.is_nan() {
        "nan".to_string()
    } else if magnitude.is_infinite() {
        "inf".to_string()
    } else {
        match conv.to_ascii_lowercase() {
            b'f' => fixed(magnitude, precision, spec.alt),
            b'e' => exponent(magnitude, precision, spec.alt),
            _ => general(magnitude, precision, spec.alt),
        }
    };

    let body = if conv.is_ascii_uppercase() {
        body.to_uppercase()
    } else {
        body
    };

    pad(spec, sign(spec, negative), &body, magnitude.is_finite())
}

fn fixed(v: f64, precision: usize, alt: bool) -> String {
    let mut s = format!("{:.*}", precision, v);
    if alt && precision == 0 {
        s.push('.');
    }
    s
}

fn split_exponent(v: f64, precision: usize) -> (String, i32) {
    let s = format!("{:.*e}", precision, v);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            (mantissa.to_string(), exp.parse().unwrap_or_default())
        }
        None => (s, 0),
    }
}

fn exponent(v: f64, precision: usize, alt: bool) -> String {
    let (mut mantissa, exp) = split_exponent(v, precision);
    if alt && precision == 0 {
        mantissa.push('.');
    }
    format!(
        "{}e{}{:02}",
        mantissa,
        if exp < 0 { '-' } else { '+' },
        exp.unsigned_abs()
    )
}

fn general(v: f64, precision: usize, alt: bool) -> String {
    let p = precision.max(1);
    let (_, exp) = split_exponent(v, p - 1);

    let mut s = if exp >= -4 && exp < p as i32 {
        fixed(v, (p as i32 - 1 - exp) as usize, alt)
    } else {
        exponent(v, p - 1, alt)
    };

    if !alt {
        let (mantissa, tail) = match s.find('e') {
            Some(at) => s.split_at(at),
            None => (s.as_str(), ""),
        };
        if mantissa.contains('.') {
            let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
            s = format!("{}{}", trimmed, tail);
        }
    }
    s
}
