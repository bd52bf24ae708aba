//! A `serde::Deserializer` over multi-valued string maps.
//!
//! This is how query strings, url-encoded forms, and multipart forms end up
//! in a typed struct. The destination's `Deserialize` impl drives the walk:
//!
//! ```text
//! T::deserialize(FormDeserializer)          ← top level must be a record
//!        ↓ deserialize_struct(fields)
//! StructAccess yields every field, supplied ones first
//!        ↓ lookup(field) → FieldSource { values, files }
//! FieldSource picks a strategy from what the field asks for:
//!   scalar  → first value (empty → zero)   Scalar
//!   Option  → Some when the key is present
//!   Vec     → every value                  Elements
//!   [T; N]  → min(N, count), rest zero     Elements
//!   struct  → first uploaded file          FileDeserializer
//!   absent  → the zero value               Zero
//! ```
//!
//! Absent keys never produce "missing field" errors: [`Zero`] hands the
//! destination its zero value instead, recursively for nested records.
//!
//! Serde lists `#[serde(alias)]` names among a struct's fields, so a field
//! with aliases is offered once per name and the derive rejects the repeat
//! as a duplicate. [`from_values`] records the offending entry in
//! [`Aliases`] and decodes again without it. Supplied names are offered
//! before absent ones, so the entry dropped is the one with nothing behind
//! it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::num::{IntErrorKind, ParseIntError};
use std::slice;

use serde::de::value::BytesDeserializer;
use serde::de::{self, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde::forward_to_deserialize_any;

use super::error::BindError;
use super::multipart::{FileHeader, Files};
use super::values::Values;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct Error {
    field: Option<String>,
    kind: ErrorKind,
}

#[derive(Debug)]
enum ErrorKind {
    TooLong,
    Invalid(String),
    Overflow(String),
    Target(String),
    Duplicate(&'static str),
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self { field: None, kind }
    }

    fn invalid(message: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Invalid(message.to_string()))
    }

    fn overflow(message: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Overflow(message.to_string()))
    }

    fn unsupported(kind: &str) -> Self {
        Self::invalid(format_args!("unsupported field type: {kind}"))
    }

    fn not_a_record() -> Self {
        Self::new(ErrorKind::Target("destination must be a struct".to_owned()))
    }

    /// Attributes the error to `field`. Called on the way out, so the
    /// outermost field name wins.
    fn in_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_owned());
        self
    }

    fn is_duplicate(&self) -> bool {
        matches!(self.kind, ErrorKind::Duplicate(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.field.as_deref().unwrap_or("?");
        match &self.kind {
            ErrorKind::TooLong => write!(f, "field value too long: {field}"),
            ErrorKind::Invalid(m) => write!(f, "invalid value for field {field}: {m}"),
            ErrorKind::Overflow(m) => write!(f, "value out of range for field {field}: {m}"),
            ErrorKind::Target(m) => f.write_str(m),
            ErrorKind::Duplicate(name) => write!(f, "duplicate field `{name}`"),
        }
    }
}

impl std::error::Error for Error {}

impl de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::invalid(msg)
    }

    fn duplicate_field(field: &'static str) -> Self {
        Self::new(ErrorKind::Duplicate(field))
    }
}

impl From<Error> for BindError {
    fn from(e: Error) -> Self {
        let field = e.field.unwrap_or_default();
        match e.kind {
            ErrorKind::TooLong => Self::FieldTooLong { field },
            ErrorKind::Invalid(message) => Self::InvalidFieldValue { field, message },
            ErrorKind::Overflow(message) => Self::Overflow { field, message },
            ErrorKind::Target(message) => Self::internal(message),
            ErrorKind::Duplicate(name) => Self::InvalidFieldValue {
                field: name.to_owned(),
                message: "duplicate field".to_owned(),
            },
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Decodes `T` from ordinary values plus, for multipart forms, uploaded files.
pub(crate) fn from_values<T>(
    values: &Values,
    files: Option<&Files>,
    max_field_length: usize,
) -> Result<T, BindError>
where
    T: de::DeserializeOwned,
{
    let aliases = Aliases::default();
    loop {
        let form = FormDeserializer { values, files, max_field_length, aliases: &aliases };
        match T::deserialize(form) {
            Err(e) if e.is_duplicate() && aliases.skip_last() => continue,
            result => return result.map_err(BindError::from),
        }
    }
}

/// Struct entries found to be alternate names of a field already offered,
/// keyed by (struct name, entry).
#[derive(Default)]
struct Aliases {
    skipped: RefCell<Vec<(&'static str, &'static str)>>,
    last: Cell<Option<(&'static str, &'static str)>>,
}

impl Aliases {
    fn is_skipped(&self, owner: &'static str, field: &'static str) -> bool {
        self.skipped.borrow().contains(&(owner, field))
    }

    fn offered(&self, owner: &'static str, field: &'static str) {
        self.last.set(Some((owner, field)));
    }

    /// Skips the entry offered last. False when there is nothing new to skip.
    fn skip_last(&self) -> bool {
        match self.last.take() {
            Some(entry) if !self.is_skipped(entry.0, entry.1) => {
                self.skipped.borrow_mut().push(entry);
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone, Copy)]
struct FormDeserializer<'a> {
    values: &'a Values,
    files: Option<&'a Files>,
    max_field_length: usize,
    aliases: &'a Aliases,
}

impl<'a> FormDeserializer<'a> {
    /// Everything supplied under exactly `key`.
    fn source(&self, key: &str) -> FieldSource<'a> {
        FieldSource {
            values: self.values.get_all(key),
            files: self.files.and_then(|f| f.get(key)).map(Vec::as_slice).unwrap_or_default(),
            max_field_length: self.max_field_length,
            aliases: self.aliases,
        }
    }

    /// Resolves a declared field name against the supplied keys: the name
    /// itself first, then its lowercase form.
    fn lookup(&self, field: &str) -> FieldSource<'a> {
        let exact = self.source(field);
        if !exact.is_absent() {
            return exact;
        }
        let lower = field.to_ascii_lowercase();
        if lower == field { exact } else { self.source(&lower) }
    }

    /// Every supplied key, sorted so map destinations bind deterministically.
    fn keys(&self) -> Vec<&'a str> {
        let mut keys: Vec<&'a str> = self.values.keys().collect();
        if let Some(files) = self.files {
            keys.extend(files.keys().map(String::as_str).filter(|k| !self.values.contains_key(k)));
        }
        keys.sort_unstable();
        keys
    }
}

/// Generates `deserialize_*` methods that refuse with the given error.
macro_rules! refuse {
    ($err:expr; $($method:ident $(($($arg:ident: $ty:ty),*))?)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, $($($arg: $ty,)*)? _visitor: V) -> Result<V::Value, Error> {
                $($(let _ = $arg;)*)?
                Err($err)
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for FormDeserializer<'a> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_map(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        let (mut entries, absent): (Vec<_>, Vec<_>) = fields
            .iter()
            .filter(|&&field| !self.aliases.is_skipped(name, field))
            .map(|&field| (field, self.lookup(field)))
            .partition(|(_, source)| !source.is_absent());
        entries.extend(absent);
        visitor.visit_map(StructAccess { owner: name, aliases: self.aliases, entries: entries.into_iter(), pending: None })
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        let keys = self.keys().into_iter();
        visitor.visit_map(EntryAccess { form: self, keys, pending: None })
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    refuse! { Error::not_a_record();
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_bytes deserialize_byte_buf deserialize_option
        deserialize_unit deserialize_seq deserialize_identifier
        deserialize_unit_struct(name: &'static str)
        deserialize_tuple(len: usize)
        deserialize_tuple_struct(name: &'static str, len: usize)
        deserialize_enum(name: &'static str, variants: &'static [&'static str])
    }
}

struct StructAccess<'a> {
    owner: &'static str,
    aliases: &'a Aliases,
    entries: std::vec::IntoIter<(&'static str, FieldSource<'a>)>,
    pending: Option<(&'static str, FieldSource<'a>)>,
}

impl<'de, 'a> MapAccess<'de> for StructAccess<'a> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        let Some((field, source)) = self.entries.next() else {
            return Ok(None);
        };
        self.aliases.offered(self.owner, field);
        self.pending = Some((field, source));
        seed.deserialize(field.into_deserializer()).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        let (field, source) = self.pending.take().ok_or_else(|| Error::invalid("value without a key"))?;
        seed.deserialize(source).map_err(|e| e.in_field(field))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

struct EntryAccess<'a> {
    form: FormDeserializer<'a>,
    keys: std::vec::IntoIter<&'a str>,
    pending: Option<(&'a str, FieldSource<'a>)>,
}

impl<'de, 'a> MapAccess<'de> for EntryAccess<'a> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        let Some(key) = self.keys.next() else {
            return Ok(None);
        };
        self.pending = Some((key, self.form.source(key)));
        seed.deserialize(key.into_deserializer()).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        let (key, source) = self.pending.take().ok_or_else(|| Error::invalid("value without a key"))?;
        seed.deserialize(source).map_err(|e| e.in_field(key))
    }
}

// ── Per-field source ──────────────────────────────────────────────────────────

/// What was supplied for one field.
#[derive(Clone, Copy)]
struct FieldSource<'a> {
    values: &'a [String],
    files: &'a [FileHeader],
    max_field_length: usize,
    aliases: &'a Aliases,
}

impl<'a> FieldSource<'a> {
    fn is_absent(&self) -> bool {
        self.values.is_empty() && self.files.is_empty()
    }

    /// The value a scalar field binds from. First value wins; an empty first
    /// value leaves the field at zero.
    fn scalar(&self) -> Result<Option<Scalar<'a>>, Error> {
        match self.values.first() {
            Some(v) if !v.is_empty() => Scalar::new(v, self.max_field_length).map(Some),
            _ => Ok(None),
        }
    }

    fn files_only(&self) -> bool {
        self.values.is_empty() && !self.files.is_empty()
    }

    fn elements(&self, positions: Option<usize>) -> Elements<'a> {
        let (values, files): (&'a [String], &'a [FileHeader]) = if self.files_only() {
            (&[], self.files)
        } else {
            (self.values, &[])
        };
        let supplied = values.len() + files.len();
        let (take, zeros) = match positions {
            Some(len) => (supplied.min(len), len.saturating_sub(supplied)),
            None => (supplied, 0),
        };
        Elements {
            values: values[..take.min(values.len())].iter(),
            files: files[..take.min(files.len())].iter(),
            zeros,
            max_field_length: self.max_field_length,
            aliases: self.aliases,
        }
    }
}

macro_rules! scalar_or_zero {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
                match self.scalar()? {
                    Some(scalar) => scalar.$method(visitor),
                    None => Zero(self.aliases).$method(visitor),
                }
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for FieldSource<'a> {
    type Error = Error;

    scalar_or_zero! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_bytes deserialize_byte_buf deserialize_identifier
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        if self.files_only() {
            return FileDeserializer(&self.files[0]).deserialize_any(visitor);
        }
        match self.values.first() {
            Some(v) => Scalar::new(v, self.max_field_length)?.deserialize_any(visitor),
            None => visitor.visit_unit(),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        if self.is_absent() { visitor.visit_none() } else { visitor.visit_some(self) }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_seq(self.elements(None))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_seq(self.elements(Some(len)))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Error> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        if let Some(file) = self.files.first() {
            FileDeserializer(file).deserialize_struct(name, fields, visitor)
        } else if self.values.is_empty() {
            Zero(self.aliases).deserialize_struct(name, fields, visitor)
        } else {
            Err(Error::unsupported("struct"))
        }
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        if self.is_absent() {
            Zero(self.aliases).deserialize_map(visitor)
        } else {
            Err(Error::unsupported("map"))
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self.scalar()? {
            Some(scalar) => scalar.deserialize_enum(name, variants, visitor),
            None => Err(Error::invalid("missing value")),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }
}

/// Positional elements for sequences and fixed-size arrays: supplied values
/// (or files) first, then zero values up to the requested length.
struct Elements<'a> {
    values: slice::Iter<'a, String>,
    files: slice::Iter<'a, FileHeader>,
    zeros: usize,
    max_field_length: usize,
    aliases: &'a Aliases,
}

impl<'de, 'a> SeqAccess<'de> for Elements<'a> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, Error> {
        if let Some(value) = self.values.next() {
            return seed.deserialize(Scalar::new(value, self.max_field_length)?).map(Some);
        }
        if let Some(file) = self.files.next() {
            return seed.deserialize(FileDeserializer(file)).map(Some);
        }
        if self.zeros > 0 {
            self.zeros -= 1;
            return seed.deserialize(Zero(self.aliases)).map(Some);
        }
        Ok(None)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.values.len() + self.files.len() + self.zeros)
    }
}

// ── Scalars ───────────────────────────────────────────────────────────────────

/// One supplied string, converted to whatever primitive the field asks for.
struct Scalar<'a> {
    value: &'a str,
}

impl<'a> Scalar<'a> {
    fn new(value: &'a str, max_field_length: usize) -> Result<Self, Error> {
        if value.len() > max_field_length {
            return Err(Error::new(ErrorKind::TooLong));
        }
        Ok(Self { value })
    }

    fn float(&self) -> Result<f64, Error> {
        let n: f64 = self.value.parse().map_err(Error::invalid)?;
        // Rust saturates out-of-range literals to infinity; only spelled-out
        // infinities are accepted as such.
        let spelled = self.value.trim_start_matches(['+', '-']).to_ascii_lowercase();
        if n.is_infinite() && !spelled.starts_with("inf") {
            return Err(Error::overflow("f64 overflow"));
        }
        Ok(n)
    }
}

fn int_error(e: ParseIntError, ty: &str) -> Error {
    match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => Error::overflow(format_args!("{ty} overflow")),
        _ => Error::invalid(e),
    }
}

/// Accepts the spellings `strconv`-style parsers accept.
fn parse_bool(s: &str) -> Result<bool, Error> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(Error::invalid(format_args!("invalid boolean `{s}`"))),
    }
}

macro_rules! parse_int {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
                let n = self.value.parse::<$ty>().map_err(|e| int_error(e, stringify!($ty)))?;
                visitor.$visit(n)
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for Scalar<'a> {
    type Error = Error;

    parse_int! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_str(self.value)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_bool(parse_bool(self.value)?)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        let n = self.float()?;
        if n.is_finite() && n.abs() > f64::from(f32::MAX) {
            return Err(Error::overflow("f32 overflow"));
        }
        visitor.visit_f32(n as f32)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_f64(self.float()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        let mut chars = self.value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(Error::invalid("expected a single character")),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_str(self.value)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_string(self.value.to_owned())
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_bytes(self.value.as_bytes())
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_byte_buf(self.value.as_bytes().to_vec())
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_enum(self.value.into_deserializer())
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_str(self.value)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    refuse! { Error::unsupported("sequence");
        deserialize_seq
        deserialize_tuple(len: usize)
        deserialize_tuple_struct(name: &'static str, len: usize)
    }

    refuse! { Error::unsupported("map");
        deserialize_map
    }

    refuse! { Error::unsupported("struct");
        deserialize_struct(name: &'static str, fields: &'static [&'static str])
    }
}

// ── Zero values ───────────────────────────────────────────────────────────────

/// Produces the zero value of whatever is asked for.
#[derive(Clone, Copy)]
struct Zero<'a>(&'a Aliases);

const NO_FIELDS: &[&str] = &[];

macro_rules! zero {
    ($($method:ident => $visit:ident($value:expr)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
                visitor.$visit($value)
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for Zero<'a> {
    type Error = Error;

    zero! {
        deserialize_bool => visit_bool(false),
        deserialize_i8 => visit_i8(0),
        deserialize_i16 => visit_i16(0),
        deserialize_i32 => visit_i32(0),
        deserialize_i64 => visit_i64(0),
        deserialize_i128 => visit_i128(0),
        deserialize_u8 => visit_u8(0),
        deserialize_u16 => visit_u16(0),
        deserialize_u32 => visit_u32(0),
        deserialize_u64 => visit_u64(0),
        deserialize_u128 => visit_u128(0),
        deserialize_f32 => visit_f32(0.0),
        deserialize_f64 => visit_f64(0.0),
        deserialize_char => visit_char('\0'),
        deserialize_str => visit_str(""),
        deserialize_string => visit_str(""),
        deserialize_identifier => visit_str(""),
        deserialize_bytes => visit_bytes(&[]),
        deserialize_byte_buf => visit_bytes(&[]),
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_none()
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_seq(ZeroElements(0, self.0))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_seq(ZeroElements(len, self.0))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_seq(ZeroElements(len, self.0))
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_map(ZeroFields { owner: "", aliases: self.0, fields: NO_FIELDS.iter() })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_map(ZeroFields { owner: name, aliases: self.0, fields: fields.iter() })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Error> {
        Err(Error::invalid("missing value"))
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }
}

struct ZeroElements<'a>(usize, &'a Aliases);

impl<'de, 'a> SeqAccess<'de> for ZeroElements<'a> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, Error> {
        if self.0 == 0 {
            return Ok(None);
        }
        self.0 -= 1;
        seed.deserialize(Zero(self.1)).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.0)
    }
}

struct ZeroFields<'a> {
    owner: &'static str,
    aliases: &'a Aliases,
    fields: slice::Iter<'static, &'static str>,
}

impl<'de, 'a> MapAccess<'de> for ZeroFields<'a> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        let aliases = self.aliases;
        let owner = self.owner;
        match self.fields.find(|&&field| !aliases.is_skipped(owner, field)) {
            Some(&field) => {
                aliases.offered(owner, field);
                seed.deserialize(field.into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        seed.deserialize(Zero(self.aliases))
    }
}

// ── Uploaded files ────────────────────────────────────────────────────────────

/// Presents one uploaded file as a record with the fields of [`FileHeader`].
struct FileDeserializer<'a>(&'a FileHeader);

const FILE_FIELDS: [&str; 4] = ["filename", "content_type", "size", "data"];

impl<'de, 'a> de::Deserializer<'de> for FileDeserializer<'a> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_map(FileFields { file: self.0, index: 0 })
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct enum
        identifier ignored_any
    }
}

struct FileFields<'a> {
    file: &'a FileHeader,
    index: usize,
}

impl<'de, 'a> MapAccess<'de> for FileFields<'a> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        match FILE_FIELDS.get(self.index) {
            Some(&key) => seed.deserialize(key.into_deserializer()).map(Some),
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        let index = self.index;
        self.index += 1;
        let file = self.file;
        let result = match index {
            0 => seed.deserialize(file.filename.as_str().into_deserializer()),
            1 => seed.deserialize(file.content_type.as_str().into_deserializer()),
            2 => seed.deserialize(file.size.into_deserializer()),
            _ => seed.deserialize(BytesDeserializer::new(file.data.as_ref())),
        };
        result.map_err(|e: Error| e.in_field(FILE_FIELDS[index.min(3)]))
    }
}
