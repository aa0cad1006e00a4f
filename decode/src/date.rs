// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use crate::Error;
use chrono::Datelike;
use chrono::NaiveDate;
use std::fmt;

/// The size of an encoded date code.
pub const DATE_CODE_SIZE: usize = 8;

/// An SFF-8636 or CMIS date code.
#[derive(Clone, Debug, PartialEq)]
pub struct DateCode {
    pub date: NaiveDate,
    pub lot: Option<String>,
}

impl DateCode {
    /// Parse a date code from its 8-byte encoding.
    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        let invalid = || Error::InvalidDate(buf.to_vec());
        if buf.len() < DATE_CODE_SIZE {
            return Err(invalid());
        }

        // The date code is specified in SFF-8636 section 6.2.36 or CMIS
        // 8.3.2.6. It is 8-octets, including:
        //
        // - Two digits for the year, relative to 2000.
        // - Two digits for the month number.
        // - Two digits for the day number.
        // - An optional 2-digit lot code.
        let digits = |range: std::ops::Range<usize>| -> Result<u32, Error> {
            let s = std::str::from_utf8(&buf[range]).map_err(|_| invalid())?;
            if !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            s.parse().map_err(|_| invalid())
        };
        let year = digits(0..2)? as i32 + 2000;
        let month = digits(2..4)?;
        let day = digits(4..6)?;
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;

        let lot = std::str::from_utf8(&buf[6..DATE_CODE_SIZE])
            .map_err(|_| invalid())?
            .trim_end_matches([' ', '\0']);
        let lot = if lot.is_empty() {
            None
        } else {
            Some(lot.to_string())
        };
        Ok(DateCode { date, lot })
    }

    /// Encode the date code into its 8-byte form.
    pub fn to_bytes(&self) -> Result<[u8; DATE_CODE_SIZE], Error> {
        let year = self.date.year() - 2000;
        let lot = self.lot.as_deref().unwrap_or("");
        if !(0..100).contains(&year) || lot.len() > 2 || !lot.is_ascii() {
            return Err(Error::InvalidDate(self.to_string().into_bytes()));
        }
        let s = format!(
            "{:02}{:02}{:02}{:<2}",
            year,
            self.date.month(),
            self.date.day(),
            lot
        );
        let mut out = [b' '; DATE_CODE_SIZE];
        out.copy_from_slice(s.as_bytes());
        Ok(out)
    }
}

impl fmt::Display for DateCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const FMT: &str = "%d %b %Y";
        if let Some(lot) = &self.lot {
            write!(f, "{} (Lot {})", self.date.format(FMT), lot,)
        } else {
            write!(f, "{}", self.date.format(FMT))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DateCode;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_date_code() {
        let parsed = DateCode::parse(b"200101  ").unwrap();
        assert_eq!(
            parsed,
            DateCode {
                date: NaiveDate::from_ymd_opt(2020, 01, 01).unwrap(),
                lot: None,
            }
        );

        let parsed = DateCode::parse(b"23120400").unwrap();
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2023, 12, 4).unwrap());
        assert_eq!(parsed.lot.as_deref(), Some("00"));
        assert_eq!(parsed.to_string(), "04 Dec 2023 (Lot 00)");
    }

    #[test]
    fn test_parse_invalid_date_code() {
        assert!(DateCode::parse(b"201301  ").is_err());
        assert!(DateCode::parse(b"2001").is_err());
        assert!(DateCode::parse(b"2O0101  ").is_err());
    }

    #[test]
    fn test_date_code_to_bytes() {
        for raw in [&b"200101  "[..], b"23120400", b"991231A "] {
            let parsed = DateCode::parse(raw).unwrap();
            assert_eq!(&parsed.to_bytes().unwrap()[..], raw);
        }
    }
}
