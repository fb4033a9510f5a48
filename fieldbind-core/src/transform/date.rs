//! Date transformer.
//!
//! Dates travel as formatted strings. The format uses `strftime`
//! specifiers (`%Y-%m-%d`, `%d %B %Y`, ...). Strings without an offset are
//! interpreted in the transformer's time zone, which is UTC unless set.
//! Any [`TimeZone`] works: a `FixedOffset`, `chrono::Local`, or a named
//! zone such as `chrono_tz::Tz`, whose daylight saving rules then apply
//! per date.
//!
//! Month and weekday names are rendered in the configured [`Locale`].
//! Parsing maps localized names back to English before handing the string
//! to chrono, which only reads English names.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::fmt::{Display, Write as _};
use std::sync::Arc;

use chrono::{
    DateTime, Local, Locale, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use serde_json::Value;

use super::ValueTransformer;
use crate::error::{FieldError, Result};

/// Converts between `DateTime<Utc>` and formatted date strings.
#[derive(Debug, Clone)]
pub struct DateTransformer<Tz = Utc> {
    format: String,
    zone: Tz,
    locale: Locale,
    names: Arc<[(String, String)]>,
}

impl DateTransformer<Utc> {
    /// A transformer for `format`, interpreting offset-less strings as UTC.
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            zone: Utc,
            locale: Locale::POSIX,
            names: Arc::from(Vec::new()),
        }
    }
}

impl DateTransformer<Local> {
    /// A transformer for `format` in the system's local time zone.
    pub fn local(format: impl Into<String>) -> Self {
        DateTransformer::new(format).with_zone(Local)
    }
}

impl<Tz: TimeZone> DateTransformer<Tz> {
    /// Interpret and render local times in `zone`.
    pub fn with_zone<Z: TimeZone>(self, zone: Z) -> DateTransformer<Z> {
        DateTransformer {
            format: self.format,
            zone,
            locale: self.locale,
            names: self.names,
        }
    }

    /// Render and read month and weekday names in `locale`.
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self.names = localized_names(locale).into();
        self
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn zone(&self) -> &Tz {
        &self.zone
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Replace localized month and weekday names with their English
    /// counterparts, longest match first.
    fn delocalize<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if self.names.is_empty() {
            return Cow::Borrowed(input);
        }

        let mut english = String::with_capacity(input.len());
        let mut rest = input;
        'scan: while !rest.is_empty() {
            for (local, name) in self.names.iter() {
                if let Some(tail) = rest.strip_prefix(local.as_str()) {
                    english.push_str(name);
                    rest = tail;
                    continue 'scan;
                }
            }
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                english.push(c);
            }
            rest = chars.as_str();
        }
        Cow::Owned(english)
    }
}

impl<Tz> DateTransformer<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    /// Parse `input` with the configured format.
    ///
    /// Accepts strings that carry their own offset, full local date-times,
    /// and bare dates (taken as midnight). Local times that fall in a
    /// daylight saving gap or overlap are rejected.
    pub fn parse(&self, input: &str) -> Result<DateTime<Utc>> {
        let text = self.delocalize(input);
        if let Ok(parsed) = DateTime::parse_from_str(&text, &self.format) {
            return Ok(parsed.with_timezone(&Utc));
        }

        let local = match NaiveDateTime::parse_from_str(&text, &self.format) {
            Ok(local) => local,
            Err(_) => NaiveDate::parse_from_str(&text, &self.format)
                .map(|date| date.and_time(NaiveTime::default()))
                .map_err(|source| FieldError::DateParse {
                    input: input.to_string(),
                    format: self.format.clone(),
                    source,
                })?,
        };

        self.zone
            .from_local_datetime(&local)
            .single()
            .map(|instant| instant.with_timezone(&Utc))
            .ok_or_else(|| FieldError::AmbiguousLocalTime {
                input: input.to_string(),
            })
    }

    /// Render `instant` in the configured zone, format and locale.
    pub fn render(&self, instant: &DateTime<Utc>) -> Result<String> {
        let local = instant.with_timezone(&self.zone);
        let mut rendered = String::new();
        write!(rendered, "{}", local.format_localized(&self.format, self.locale)).map_err(|_| {
            FieldError::InvalidDateFormat {
                format: self.format.clone(),
            }
        })?;
        Ok(rendered)
    }
}

/// Pairs of (localized, English) month and weekday names, full and
/// abbreviated, that differ between `locale` and English.
fn localized_names(locale: Locale) -> Vec<(String, String)> {
    let months = (1..=12)
        .filter_map(|month| NaiveDate::from_ymd_opt(1970, month, 1))
        .map(|date| (date, ["%B", "%b"]));
    // 1970-01-05 was a Monday.
    let weekdays = (5..=11)
        .filter_map(|day| NaiveDate::from_ymd_opt(1970, 1, day))
        .map(|date| (date, ["%A", "%a"]));

    let mut names: Vec<(String, String)> = Vec::new();
    for (date, specifiers) in months.chain(weekdays) {
        let instant = Utc.from_utc_datetime(&date.and_time(NaiveTime::default()));
        for specifier in specifiers {
            let local = instant.format_localized(specifier, locale).to_string();
            let english = instant.format(specifier).to_string();
            if local != english && !names.iter().any(|(known, _)| *known == local) {
                names.push((local, english));
            }
        }
    }
    names.sort_by_key(|(local, _)| Reverse(local.len()));
    names
}

impl<Tz> From<DateTransformer<Tz>> for ValueTransformer<DateTime<Utc>>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Display,
{
    fn from(dates: DateTransformer<Tz>) -> Self {
        let exporter = dates.clone();
        ValueTransformer::try_new(
            move |value| match value {
                Value::String(text) => dates.parse(text),
                other => Err(FieldError::mismatch("date string", other)),
            },
            move |instant| exporter.render(instant).map(Value::String),
        )
    }
}
