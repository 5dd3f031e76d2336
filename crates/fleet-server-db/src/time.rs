// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::DbError;

/// Fixed-width RFC 3339 so stored timestamps order lexicographically.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_ts(field: &str, value: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| DbError::Internal(format!("Invalid {field}: {value}")))
}

pub(crate) fn parse_opt_ts(field: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
	value.map(|v| parse_ts(field, &v)).transpose()
}
