//! Value fabrication.
//!
//! A [`CapabilityRegistry`] maps category names (`email`, `first_name`,
//! `integer`, ...) to producers. Each column resolves its producer once when
//! the table plan is built; the hot path only calls [`Producer::produce`].

use super::value::Value;
use crate::config::ColumnConfig;
use crate::error::SeedError;
use crate::schema::{Column, ColumnClass, ColumnType, IntWidth, NumericRange};
use ahash::AHashMap;
use chrono::{Duration, NaiveDate};
use fake::faker::address::en::{CityName, CountryName, StateName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{Password, SafeEmail, Username};
use fake::faker::lorem::en::{Paragraph, Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::rngs::StdRng;
use rand::Rng;
use std::mem;
use std::ops::Bound;
use std::sync::Arc;

/// Smallest value drawn when only the type bounds an integer column
const DEFAULT_INT_MIN: i64 = 1;
const DEFAULT_PRECISION: u8 = 10;
const DEFAULT_SCALE: u8 = 2;
const DEFAULT_DECIMAL_MAX: f64 = 10_000.0;
const MAX_BINARY_LEN: u32 = 32;

/// Everything a producer needs to know about the target column.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub table: String,
    pub column: String,
    pub col_type: ColumnType,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    /// CHECK range narrowed by configured `min_value`/`max_value`
    pub range: NumericRange,
    pub precision: Option<u8>,
    pub scale: u8,
    pub enum_values: Vec<String>,
}

impl FieldSpec {
    pub fn new(table: &str, column: &Column, class: &ColumnClass, config: Option<&ColumnConfig>) -> Self {
        let mut range = class.range.unwrap_or_else(NumericRange::unbounded);
        let mut min_length = None;
        let mut max_length = column.max_length;
        if let Some(config) = config {
            let configured = NumericRange {
                min: config.min_value.map_or(Bound::Unbounded, Bound::Included),
                max: config.max_value.map_or(Bound::Unbounded, Bound::Included),
            };
            range = range.intersect(configured);
            min_length = config.min_length;
            max_length = match (max_length, config.max_length) {
                (Some(declared), Some(wanted)) => Some(declared.min(wanted)),
                (declared, wanted) => wanted.or(declared),
            };
        }
        let scale = match column.col_type {
            ColumnType::Decimal => column.scale.unwrap_or(DEFAULT_SCALE),
            _ => 0,
        };
        Self {
            table: table.to_string(),
            column: column.name.clone(),
            col_type: column.col_type.clone(),
            min_length,
            max_length,
            range,
            precision: column.precision,
            scale,
            enum_values: column.enum_values.clone(),
        }
    }

    /// Coerce a produced value into this column's shape.
    ///
    /// Returns `None` when the value cannot represent the column (wrong type,
    /// or outside the numeric range) so the caller can fall back to a
    /// type-based value.
    pub fn conform(&self, value: Value) -> Option<Value> {
        let value = match (&self.col_type, value) {
            (_, Value::Null) => return Some(Value::Null),
            (ColumnType::Text, Value::Text(s) | Value::Uuid(s) | Value::Json(s)) => {
                Value::Text(self.fit_text(s))
            }
            (ColumnType::Text, other) => Value::Text(self.fit_text(other.to_string())),
            (ColumnType::Enum, Value::Text(s)) => {
                if self.enum_values.is_empty() || self.enum_values.contains(&s) {
                    Value::Text(s)
                } else {
                    return None;
                }
            }
            (ColumnType::Uuid, Value::Uuid(s) | Value::Text(s)) => Value::Uuid(s),
            (ColumnType::Json, Value::Json(s)) => Value::Json(s),
            (ColumnType::Json, Value::Text(s)) => {
                Value::Json(serde_json::Value::String(s).to_string())
            }
            (ColumnType::Integer(_), Value::Int(n)) => Value::Int(n),
            (ColumnType::Integer(_), Value::Bool(b)) => Value::Int(b as i64),
            (ColumnType::Boolean, Value::Bool(b)) => Value::Bool(b),
            (ColumnType::Boolean, Value::Int(n)) => Value::Bool(n != 0),
            (ColumnType::Decimal, Value::Decimal { units, scale }) => {
                Value::decimal(units as f64 / 10f64.powi(scale as i32), self.scale)
            }
            (ColumnType::Decimal, Value::Int(n)) => Value::decimal(n as f64, self.scale),
            (ColumnType::Date, Value::Date(d)) => Value::Date(d),
            (ColumnType::Date, Value::DateTime(dt)) => Value::Date(dt.date()),
            (ColumnType::DateTime, Value::DateTime(dt)) => Value::DateTime(dt),
            (ColumnType::DateTime, Value::Date(d)) => Value::DateTime(d.and_hms_opt(0, 0, 0)?),
            (ColumnType::Binary, Value::Bytes(b)) => Value::Bytes(b),
            (ColumnType::Binary, Value::Text(s)) => {
                let mut bytes = s.into_bytes();
                if let Some(max) = self.max_length {
                    bytes.truncate(max as usize);
                }
                Value::Bytes(bytes)
            }
            (col_type, Value::Text(s)) => Value::parse_typed(&s, col_type, Some(self.scale))?,
            _ => return None,
        };
        if let (Some((lo, hi)), Value::Int(n)) = (self.col_type.integer_limits(), &value) {
            if *n < lo || *n > hi {
                return None;
            }
        }
        match value.as_f64() {
            Some(n) if !self.range.contains(n) => None,
            _ => Some(value),
        }
    }

    fn fit_text(&self, mut s: String) -> String {
        if let Some(max) = self.max_length {
            let max = max as usize;
            if s.len() > max {
                s = s.chars().take(max).collect();
            }
        }
        s
    }

    /// Inclusive integer bounds: the range clipped to the column's storage
    /// width. Open ends default to `1..=type max`.
    pub fn integer_bounds(&self) -> (i64, i64) {
        let (type_lo, type_hi) = self
            .col_type
            .integer_limits()
            .unwrap_or((i64::MIN, i64::MAX));
        let lo = match self.range.min {
            Bound::Included(v) => Some(v.ceil() as i64),
            Bound::Excluded(v) => Some((v.floor() as i64).saturating_add(1)),
            Bound::Unbounded => None,
        };
        let hi = match self.range.max {
            Bound::Included(v) => Some(v.floor() as i64),
            Bound::Excluded(v) => Some((v.ceil() as i64).saturating_sub(1)),
            Bound::Unbounded => None,
        };
        let (lo, hi) = match (lo, hi) {
            (Some(lo), Some(hi)) => (lo, hi),
            (Some(lo), None) => (lo, type_hi),
            (None, Some(hi)) if hi < DEFAULT_INT_MIN => (type_lo, hi),
            (None, Some(hi)) => (DEFAULT_INT_MIN, hi),
            (None, None) => (DEFAULT_INT_MIN, type_hi),
        };
        let lo = lo.clamp(type_lo, type_hi);
        (lo, hi.clamp(type_lo, type_hi).max(lo))
    }

    /// Inclusive decimal bounds, limited by the declared precision.
    pub fn decimal_bounds(&self) -> (f64, f64) {
        let precision = self.precision.unwrap_or(DEFAULT_PRECISION).max(self.scale + 1);
        let step = 10f64.powi(-(self.scale as i32));
        let magnitude = 10f64.powi((precision - self.scale) as i32) - step;
        let lo = match self.range.min {
            Bound::Included(v) => v,
            Bound::Excluded(v) => v + step,
            Bound::Unbounded => 0.0,
        };
        let hi = match self.range.max {
            Bound::Included(v) => v,
            Bound::Excluded(v) => v - step,
            Bound::Unbounded => DEFAULT_DECIMAL_MAX.max(lo + DEFAULT_DECIMAL_MAX),
        };
        let lo = lo.max(-magnitude);
        let hi = hi.min(magnitude);
        (lo, hi.max(lo))
    }
}

/// Fabricates values for one column.
///
/// Producers receive the worker's seeded RNG so a run with a fixed seed and
/// one worker is reproducible.
pub trait Producer: Send + Sync {
    fn produce(&self, field: &FieldSpec, rng: &mut StdRng) -> Value;
}

/// Semantic categories backed by the `fake` crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Name,
    FirstName,
    LastName,
    Email,
    Phone,
    Address,
    Street,
    City,
    State,
    Country,
    ZipCode,
    Company,
    JobTitle,
    Username,
    Password,
    CreditCard,
    IpAddress,
    Url,
    Lorem,
    Sentence,
    Word,
}

impl Category {
    const ALL: [(&'static str, Category); 21] = [
        ("name", Category::Name),
        ("first_name", Category::FirstName),
        ("last_name", Category::LastName),
        ("email", Category::Email),
        ("phone", Category::Phone),
        ("address", Category::Address),
        ("street", Category::Street),
        ("city", Category::City),
        ("state", Category::State),
        ("country", Category::Country),
        ("zipcode", Category::ZipCode),
        ("company", Category::Company),
        ("job_title", Category::JobTitle),
        ("username", Category::Username),
        ("password", Category::Password),
        ("credit_card", Category::CreditCard),
        ("ip_address", Category::IpAddress),
        ("url", Category::Url),
        ("lorem", Category::Lorem),
        ("sentence", Category::Sentence),
        ("word", Category::Word),
    ];

    fn fabricate(self, rng: &mut StdRng) -> String {
        match self {
            Category::Name => Name().fake_with_rng(rng),
            Category::FirstName => FirstName().fake_with_rng(rng),
            Category::LastName => LastName().fake_with_rng(rng),
            Category::Email => SafeEmail().fake_with_rng(rng),
            Category::Phone => PhoneNumber().fake_with_rng(rng),
            Category::Address => {
                let street: String = StreetName().fake_with_rng(rng);
                let city: String = CityName().fake_with_rng(rng);
                let state: String = StateName().fake_with_rng(rng);
                let zip: String = ZipCode().fake_with_rng(rng);
                format!("{} {}, {}, {} {}", rng.random_range(1..9999), street, city, state, zip)
            }
            Category::Street => StreetName().fake_with_rng(rng),
            Category::City => CityName().fake_with_rng(rng),
            Category::State => StateName().fake_with_rng(rng),
            Category::Country => CountryName().fake_with_rng(rng),
            Category::ZipCode => ZipCode().fake_with_rng(rng),
            Category::Company => CompanyName().fake_with_rng(rng),
            Category::JobTitle => {
                let titles = [
                    "Software Engineer",
                    "Product Manager",
                    "Data Analyst",
                    "Designer",
                    "Marketing Manager",
                    "Sales Representative",
                    "Customer Support",
                    "Operations Manager",
                    "Accountant",
                    "Site Reliability Engineer",
                ];
                titles[rng.random_range(0..titles.len())].to_string()
            }
            Category::Username => Username().fake_with_rng(rng),
            Category::Password => Password(12..20).fake_with_rng(rng),
            Category::CreditCard => format!(
                "{:04}-{:04}-{:04}-{:04}",
                rng.random_range(1000..9999),
                rng.random_range(1000..9999),
                rng.random_range(1000..9999),
                rng.random_range(1000..9999)
            ),
            Category::IpAddress => format!(
                "{}.{}.{}.{}",
                rng.random_range(1..255),
                rng.random_range(0..255),
                rng.random_range(0..255),
                rng.random_range(1..255)
            ),
            Category::Url => format!(
                "https://example{}.com/{}",
                rng.random_range(1..1000),
                Word().fake_with_rng::<String, _>(rng)
            ),
            Category::Lorem => Paragraph(1..3).fake_with_rng(rng),
            Category::Sentence => Sentence(3..8).fake_with_rng(rng),
            Category::Word => Word().fake_with_rng(rng),
        }
    }
}

/// Producer for a semantic category; falls back to a type-based value when
/// the category text does not fit the column.
#[derive(Debug, Clone, Copy)]
pub struct FakeProducer(pub Category);

impl Producer for FakeProducer {
    fn produce(&self, field: &FieldSpec, rng: &mut StdRng) -> Value {
        let text = self.0.fabricate(rng);
        field
            .conform(Value::Text(text))
            .unwrap_or_else(|| type_value(field, rng))
    }
}

/// Producer driven by a fixed logical type, ignoring the column's own type
/// until the value is conformed.
#[derive(Debug, Clone)]
pub struct TypeProducer(pub ColumnType);

impl Producer for TypeProducer {
    fn produce(&self, field: &FieldSpec, rng: &mut StdRng) -> Value {
        if mem::discriminant(&self.0) == mem::discriminant(&field.col_type) {
            return type_value(field, rng);
        }
        let mut as_type = field.clone();
        as_type.col_type = self.0.clone();
        let value = type_value(&as_type, rng);
        field.conform(value).unwrap_or_else(|| type_value(field, rng))
    }
}

/// Uniform draw from `possible_values`
#[derive(Debug, Clone)]
pub struct ChoiceProducer {
    values: Vec<Value>,
}

impl ChoiceProducer {
    pub fn new(values: Vec<Value>) -> Option<Self> {
        if values.is_empty() {
            None
        } else {
            Some(Self { values })
        }
    }
}

impl Producer for ChoiceProducer {
    fn produce(&self, _field: &FieldSpec, rng: &mut StdRng) -> Value {
        self.values[rng.random_range(0..self.values.len())].clone()
    }
}

/// Weighted draw from `weighted_values`
#[derive(Debug, Clone)]
pub struct WeightedProducer {
    values: Vec<Value>,
    cumulative: Vec<f64>,
}

impl WeightedProducer {
    pub fn new(weighted: Vec<(Value, f64)>) -> Option<Self> {
        let mut values = Vec::with_capacity(weighted.len());
        let mut cumulative = Vec::with_capacity(weighted.len());
        let mut total = 0.0;
        for (value, weight) in weighted {
            if weight <= 0.0 {
                continue;
            }
            total += weight;
            values.push(value);
            cumulative.push(total);
        }
        if values.is_empty() {
            None
        } else {
            Some(Self { values, cumulative })
        }
    }
}

impl Producer for WeightedProducer {
    fn produce(&self, _field: &FieldSpec, rng: &mut StdRng) -> Value {
        let total = self.cumulative[self.cumulative.len() - 1];
        let pick = rng.random_range(0.0..total);
        let idx = self
            .cumulative
            .partition_point(|&c| c <= pick)
            .min(self.values.len() - 1);
        self.values[idx].clone()
    }
}

/// Values common in existing rows, drawn in proportion to how often they
/// were sampled, for `share` of the rows. The rest come from `fresh`.
pub struct PatternProducer {
    common: WeightedProducer,
    share: f64,
    fresh: Arc<dyn Producer>,
}

impl PatternProducer {
    pub fn new(common: &[(Value, u64)], share: f64, fresh: Arc<dyn Producer>) -> Option<Self> {
        let weighted = common.iter().map(|(v, n)| (v.clone(), *n as f64)).collect();
        Some(Self {
            common: WeightedProducer::new(weighted)?,
            share: share.clamp(0.0, 1.0),
            fresh,
        })
    }
}

impl Producer for PatternProducer {
    fn produce(&self, field: &FieldSpec, rng: &mut StdRng) -> Value {
        if rng.random_bool(self.share) {
            self.common.produce(field, rng)
        } else {
            self.fresh.produce(field, rng)
        }
    }
}

/// Fresh value of the field's own logical type within its bounds.
pub fn type_value(field: &FieldSpec, rng: &mut StdRng) -> Value {
    match field.col_type {
        ColumnType::Integer(_) => {
            let (lo, hi) = field.integer_bounds();
            Value::Int(rng.random_range(lo..=hi))
        }
        ColumnType::Decimal => {
            let (lo, hi) = field.decimal_bounds();
            let raw = if hi > lo { rng.random_range(lo..=hi) } else { lo };
            let mut value = Value::decimal(raw, field.scale);
            if let Some(n) = value.as_f64() {
                if !field.range.contains(n) {
                    value = Value::decimal(lo, field.scale);
                }
            }
            value
        }
        ColumnType::Text => Value::Text(text_value(field, rng)),
        ColumnType::Date => Value::Date(random_date(rng)),
        ColumnType::DateTime => {
            let date = random_date(rng);
            let seconds = rng.random_range(0..86_400);
            let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
            Value::DateTime(midnight + Duration::seconds(seconds))
        }
        ColumnType::Boolean => Value::Bool(rng.random_bool(0.5)),
        ColumnType::Json => {
            let label: String = Word().fake_with_rng(rng);
            let doc = serde_json::json!({
                "id": rng.random_range(1..100_000),
                "label": label,
                "active": rng.random_bool(0.5),
            });
            Value::Json(doc.to_string())
        }
        ColumnType::Binary => {
            let cap = field.max_length.unwrap_or(MAX_BINARY_LEN).clamp(1, MAX_BINARY_LEN);
            let len = rng.random_range(1..=cap) as usize;
            Value::Bytes((0..len).map(|_| rng.random::<u8>()).collect())
        }
        ColumnType::Uuid => Value::Uuid(uuid_v4(rng)),
        ColumnType::Enum => {
            if field.enum_values.is_empty() {
                Value::Text(Word().fake_with_rng(rng))
            } else {
                let idx = rng.random_range(0..field.enum_values.len());
                Value::Text(field.enum_values[idx].clone())
            }
        }
    }
}

fn text_value(field: &FieldSpec, rng: &mut StdRng) -> String {
    let min = field.min_length.unwrap_or(0) as usize;
    let max = field.max_length.map(|m| m as usize).unwrap_or(255).max(min).max(1);
    let mut text: String = if max <= 12 {
        Word().fake_with_rng(rng)
    } else {
        Sentence(2..6).fake_with_rng(rng)
    };
    while text.len() < min {
        let word: String = Word().fake_with_rng(rng);
        text.push(' ');
        text.push_str(&word);
    }
    if text.len() > max {
        text = text.chars().take(max).collect();
    }
    text
}

fn random_date(rng: &mut StdRng) -> NaiveDate {
    let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
    start + Duration::days(rng.random_range(0..9497))
}

fn uuid_v4(rng: &mut StdRng) -> String {
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        rng.random::<u32>(),
        rng.random::<u16>(),
        (rng.random::<u16>() & 0x0FFF) | 0x4000,
        (rng.random::<u16>() & 0x3FFF) | 0x8000,
        rng.random::<u64>() & 0xFFFF_FFFF_FFFF_u64
    )
}

/// Guess a category from a column's name and type.
pub fn detect_category(column_name: &str, col_type: &ColumnType) -> Option<&'static str> {
    let name = column_name.to_lowercase();

    if matches!(col_type, ColumnType::Integer(_) | ColumnType::Boolean) {
        let flag_prefix = ["is_", "has_", "can_", "should_"]
            .iter()
            .any(|p| name.starts_with(p));
        let flag_word = [
            "active",
            "enabled",
            "visible",
            "deleted",
            "archived",
            "published",
            "verified",
            "confirmed",
        ]
        .iter()
        .any(|w| name.contains(w));
        if flag_prefix || flag_word {
            return Some("boolean");
        }
        return None;
    }

    if !matches!(col_type, ColumnType::Text) {
        return None;
    }

    if name.contains("email") || name.contains("mail") {
        return Some("email");
    }
    if name.contains("phone") || name.contains("mobile") || name == "tel" || name.ends_with("_tel") {
        return Some("phone");
    }
    if name.contains("url") || name.contains("website") || name.contains("link") {
        return Some("url");
    }
    if name.contains("password") || name.contains("passwd") {
        return Some("password");
    }
    if name.contains("username") || name.contains("user_name") || name == "login" {
        return Some("username");
    }
    if name == "uuid" || name == "guid" || name.ends_with("_uuid") {
        return Some("uuid");
    }
    if name == "ip" || name.contains("ip_addr") {
        return Some("ip_address");
    }
    if name.contains("credit_card") || name.starts_with("cc_") {
        return Some("credit_card");
    }
    if name.contains("zip") || name.contains("postal") {
        return Some("zipcode");
    }
    if name.contains("city") {
        return Some("city");
    }
    if name.contains("country") {
        return Some("country");
    }
    if name == "state" || name.contains("province") {
        return Some("state");
    }
    if name.contains("street") {
        return Some("street");
    }
    if name.contains("address") {
        return Some("address");
    }
    if name.contains("job_title") {
        return Some("job_title");
    }
    if ["description", "notes", "comment", "bio", "body"]
        .iter()
        .any(|w| name.contains(w))
    {
        return Some("lorem");
    }
    if (name.contains("name") || name.contains("title") || name.contains("label"))
        && !name.contains("file")
    {
        if name.contains("first") || name == "fname" {
            return Some("first_name");
        }
        if name.contains("last") || name.contains("surname") {
            return Some("last_name");
        }
        if name.contains("company") || name.contains("business") {
            return Some("company");
        }
        if name.contains("title") {
            return Some("sentence");
        }
        return Some("name");
    }
    if name.contains("company") || name.contains("organization") {
        return Some("company");
    }
    None
}

/// Category name → producer
#[derive(Clone)]
pub struct CapabilityRegistry {
    producers: AHashMap<String, Arc<dyn Producer>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("producers", &self.names())
            .finish()
    }
}

impl CapabilityRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            producers: AHashMap::new(),
        }
    }

    /// Type producers for every logical type plus the `fake`-backed categories.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for col_type in [
            ColumnType::Integer(IntWidth::Big),
            ColumnType::Decimal,
            ColumnType::Text,
            ColumnType::Date,
            ColumnType::DateTime,
            ColumnType::Boolean,
            ColumnType::Json,
            ColumnType::Binary,
            ColumnType::Uuid,
            ColumnType::Enum,
        ] {
            registry.register(col_type.as_str(), Arc::new(TypeProducer(col_type)));
        }
        for (name, category) in Category::ALL {
            registry.register(name, Arc::new(FakeProducer(category)));
        }
        registry.alias("full_name", "name");
        registry.alias("zip_code", "zipcode");
        registry.alias("postal_code", "zipcode");
        registry.alias("phone_number", "phone");
        registry.alias("ip", "ip_address");
        registry.alias("company_name", "company");
        registry.alias("paragraph", "lorem");
        registry.alias("timestamp", "datetime");
        registry
    }

    /// Register or replace a producer
    pub fn register(&mut self, name: &str, producer: Arc<dyn Producer>) {
        self.producers.insert(name.to_lowercase(), producer);
    }

    fn alias(&mut self, alias: &str, target: &str) {
        if let Some(producer) = self.get(target) {
            self.producers.insert(alias.to_string(), producer);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Producer>> {
        self.producers.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.producers.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.producers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Pick the producer for a column: the explicit generator function,
    /// else a category detected from the name, else the column's type.
    pub fn resolve(
        &self,
        table: &str,
        column: &Column,
        explicit: Option<&str>,
    ) -> Result<(String, Arc<dyn Producer>), SeedError> {
        if let Some(name) = explicit {
            return self
                .get(name)
                .map(|p| (name.to_lowercase(), p))
                .ok_or_else(|| {
                    SeedError::Config(format!(
                        "{}.{}: unknown generator function '{}'",
                        table, column.name, name
                    ))
                });
        }
        if let Some(category) = detect_category(&column.name, &column.col_type) {
            if let Some(producer) = self.get(category) {
                return Ok((category.to_string(), producer));
            }
        }
        let name = column.col_type.as_str();
        let producer = self
            .get(name)
            .unwrap_or_else(|| Arc::new(TypeProducer(column.col_type.clone())));
        Ok((name.to_string(), producer))
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnId;
    use rand::SeedableRng;

    fn field(col_type: ColumnType) -> FieldSpec {
        let column = Column::new("c", col_type, ColumnId(0));
        FieldSpec::new("t", &column, &ColumnClass::default(), None)
    }

    #[test]
    fn test_detect_category() {
        assert_eq!(detect_category("email_address", &ColumnType::Text), Some("email"));
        assert_eq!(detect_category("first_name", &ColumnType::Text), Some("first_name"));
        assert_eq!(detect_category("company_name", &ColumnType::Text), Some("company"));
        let int = ColumnType::Integer(IntWidth::Regular);
        assert_eq!(detect_category("is_active", &int), Some("boolean"));
        assert_eq!(detect_category("filename", &ColumnType::Text), None);
        assert_eq!(detect_category("quantity", &int), None);
        assert_eq!(detect_category("email", &int), None);
    }

    #[test]
    fn test_integer_respects_range() {
        let mut f = field(ColumnType::Integer(IntWidth::Regular));
        f.range = NumericRange {
            min: Bound::Excluded(0.0),
            max: Bound::Included(5.0),
        };
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let v = type_value(&f, &mut rng).as_i64().unwrap();
            assert!((1..=5).contains(&v));
        }
    }

    #[test]
    fn test_integer_bounds_follow_width() {
        assert_eq!(field(ColumnType::Integer(IntWidth::Tiny)).integer_bounds(), (1, 127));
        assert_eq!(
            field(ColumnType::Integer(IntWidth::USmall)).integer_bounds(),
            (1, 65_535)
        );
        assert_eq!(
            field(ColumnType::Integer(IntWidth::Regular)).integer_bounds(),
            (1, i32::MAX as i64)
        );

        let mut f = field(ColumnType::Integer(IntWidth::Small));
        f.range = NumericRange {
            min: Bound::Included(-100_000.0),
            max: Bound::Unbounded,
        };
        assert_eq!(f.integer_bounds(), (i16::MIN as i64, i16::MAX as i64));

        let mut f = field(ColumnType::Integer(IntWidth::UTiny));
        f.range = NumericRange {
            min: Bound::Unbounded,
            max: Bound::Excluded(0.0),
        };
        assert_eq!(f.integer_bounds(), (0, 0));
    }

    #[test]
    fn test_narrow_integer_values_fit() {
        let registry = CapabilityRegistry::with_builtins();
        let mut rng = StdRng::seed_from_u64(6);
        for (name, width, lo, hi) in [
            ("qty", IntWidth::Small, 1, 32_767),
            ("flag", IntWidth::Tiny, 1, 127),
        ] {
            let column = Column::new(name, ColumnType::Integer(width), ColumnId(0));
            let (_, producer) = registry.resolve("t", &column, None).unwrap();
            let f = FieldSpec::new("t", &column, &ColumnClass::default(), None);
            for _ in 0..500 {
                let v = producer.produce(&f, &mut rng).as_i64().unwrap();
                assert!((lo..=hi).contains(&v), "{} = {}", name, v);
            }
        }
    }

    #[test]
    fn test_conform_rejects_out_of_width() {
        let f = field(ColumnType::Integer(IntWidth::Tiny));
        assert_eq!(f.conform(Value::Int(100)), Some(Value::Int(100)));
        assert_eq!(f.conform(Value::Int(1_000)), None);
    }

    #[test]
    fn test_decimal_respects_precision() {
        let mut column = Column::new("price", ColumnType::Decimal, ColumnId(0));
        column.precision = Some(5);
        column.scale = Some(2);
        let f = FieldSpec::new("t", &column, &ColumnClass::default(), None);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..200 {
            let v = type_value(&f, &mut rng).as_f64().unwrap();
            assert!((0.0..=999.99).contains(&v));
        }
    }

    #[test]
    fn test_text_truncated_to_max_length() {
        let mut f = field(ColumnType::Text);
        f.max_length = Some(8);
        let mut rng = StdRng::seed_from_u64(3);
        let email = FakeProducer(Category::Email).produce(&f, &mut rng);
        match email {
            Value::Text(s) => assert!(s.chars().count() <= 8),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_weighted_producer_skips_zero_weights() {
        let p = WeightedProducer::new(vec![
            (Value::Text("a".into()), 0.0),
            (Value::Text("b".into()), 1.0),
        ])
        .unwrap();
        let f = field(ColumnType::Text);
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            assert_eq!(p.produce(&f, &mut rng), Value::Text("b".into()));
        }
    }

    #[test]
    fn test_pattern_producer_mixes_common_and_fresh() {
        let fresh: Arc<dyn Producer> = Arc::new(ChoiceProducer::new(vec![Value::Int(-1)]).unwrap());
        let common = [(Value::Int(7), 3), (Value::Int(8), 1)];
        let p = PatternProducer::new(&common, 0.5, fresh).unwrap();
        let f = field(ColumnType::Integer(IntWidth::Regular));
        let mut rng = StdRng::seed_from_u64(11);

        let mut counts = AHashMap::new();
        for _ in 0..4000 {
            *counts.entry(p.produce(&f, &mut rng)).or_insert(0u32) += 1;
        }
        assert_eq!(counts.len(), 3);
        let fresh_share = counts[&Value::Int(-1)] as f64 / 4000.0;
        assert!((0.45..0.55).contains(&fresh_share), "{}", fresh_share);
        assert!(counts[&Value::Int(7)] > counts[&Value::Int(8)] * 2);

        assert!(PatternProducer::new(&[], 0.5, Arc::new(ChoiceProducer::new(vec![Value::Null]).unwrap())).is_none());
    }

    #[test]
    fn test_resolve_unknown_generator_is_config_error() {
        let registry = CapabilityRegistry::with_builtins();
        let column = Column::new("x", ColumnType::Text, ColumnId(0));
        assert!(matches!(
            registry.resolve("t", &column, Some("nonsense")),
            Err(SeedError::Config(_))
        ));
        let (name, _) = registry.resolve("t", &column, Some("Email")).unwrap();
        assert_eq!(name, "email");
        let (name, _) = registry.resolve("t", &column, None).unwrap();
        assert_eq!(name, "text");
    }

    #[test]
    fn test_boolean_category_on_integer_column() {
        let registry = CapabilityRegistry::with_builtins();
        let column = Column::new("is_deleted", ColumnType::Integer(IntWidth::Tiny), ColumnId(0));
        let (name, producer) = registry.resolve("t", &column, None).unwrap();
        assert_eq!(name, "boolean");
        let f = FieldSpec::new("t", &column, &ColumnClass::default(), None);
        let mut rng = StdRng::seed_from_u64(5);
        let v = producer.produce(&f, &mut rng).as_i64().unwrap();
        assert!(v == 0 || v == 1);
    }
}
