//! Minimal reading of gettext PO catalogs
//!
//! Translation import only needs the catalog's metadata: which language it
//! carries and how complete it is. The engine does the actual application
//! of translations to definitions.

use crate::error::{EngineError, EngineResult};

/// Summary of a PO catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoInfo {
    /// The `Language` header value, if present
    pub language: Option<String>,

    /// Number of translatable entries, excluding the header
    pub num_entries: usize,

    /// Number of entries with a non-empty translation
    pub num_translations: usize,
}

impl PoInfo {
    /// Percentage of entries which are translated, as a whole number
    pub fn pct_translated(&self) -> usize {
        if self.num_entries == 0 {
            return 0;
        }
        self.num_translations * 100 / self.num_entries
    }
}

#[derive(PartialEq)]
enum Field {
    None,
    MsgId,
    MsgStr,
}

/// Parse the metadata of a PO catalog.
///
/// Only the structure needed for [`PoInfo`] is interpreted: entries are
/// `msgid`/`msgstr` pairs with continuation strings, and the header is the
/// entry with an empty msgid, whose msgstr holds `Name: value` lines.
pub fn parse_info(catalog: &str) -> EngineResult<PoInfo> {
    let mut entries: Vec<(String, String)> = Vec::new();
    let mut msgid = String::new();
    let mut msgstr = String::new();
    let mut field = Field::None;

    let finish_entry =
        |msgid: &mut String, msgstr: &mut String, entries: &mut Vec<(String, String)>| {
            entries.push((std::mem::take(msgid), std::mem::take(msgstr)));
        };

    for (num, line) in catalog.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix("msgid ") {
            if field == Field::MsgStr {
                finish_entry(&mut msgid, &mut msgstr, &mut entries);
            }
            msgid = unquote(rest, num)?;
            field = Field::MsgId;
        } else if let Some(rest) = line.strip_prefix("msgstr ") {
            if field != Field::MsgId {
                return Err(EngineError::InvalidCatalog(format!(
                    "msgstr without msgid on line {}",
                    num + 1
                )));
            }
            msgstr = unquote(rest, num)?;
            field = Field::MsgStr;
        } else if line.starts_with('"') {
            let part = unquote(line, num)?;
            match field {
                Field::MsgId => msgid.push_str(&part),
                Field::MsgStr => msgstr.push_str(&part),
                Field::None => {
                    return Err(EngineError::InvalidCatalog(format!(
                        "unexpected string on line {}",
                        num + 1
                    )))
                }
            }
        } else if line.starts_with("msgctxt ") {
            // contexts are carried but not needed for the summary
            if field == Field::MsgStr {
                finish_entry(&mut msgid, &mut msgstr, &mut entries);
                field = Field::None;
            }
        } else {
            return Err(EngineError::InvalidCatalog(format!(
                "unrecognized line {}",
                num + 1
            )));
        }
    }

    if field == Field::MsgStr {
        finish_entry(&mut msgid, &mut msgstr, &mut entries);
    }

    let mut language = None;
    let mut num_entries = 0;
    let mut num_translations = 0;

    for (id, translation) in &entries {
        if id.is_empty() {
            // the header entry, one "Name: value" per line
            for header in translation.split('\n') {
                if let Some(value) = header.strip_prefix("Language:") {
                    let value = value.trim();
                    if !value.is_empty() {
                        language = Some(value.to_string());
                    }
                }
            }
        } else {
            num_entries += 1;
            if !translation.is_empty() {
                num_translations += 1;
            }
        }
    }

    Ok(PoInfo {
        language,
        num_entries,
        num_translations,
    })
}

/// Strip the surrounding quotes of a PO string and unescape it
fn unquote(raw: &str, num: usize) -> EngineResult<String> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| {
            EngineError::InvalidCatalog(format!("malformed string on line {}", num + 1))
        })?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                other => {
                    return Err(EngineError::InvalidCatalog(format!(
                        "bad escape {:?} on line {}",
                        other,
                        num + 1
                    )))
                }
            }
        } else {
            out.push(c);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
#  Translations extracted from flows
msgid ""
msgstr ""
"POT-Creation-Date: 2024-03-14 10:00+0000\n"
"Language: fra\n"
"MIME-Version: 1.0\n"

#: Color Flow
msgid "What is your favorite color?"
msgstr "Quelle est ta couleur préférée?"

msgid "Red"
msgstr ""

msgid "Blue "
"and green"
msgstr "Bleu "
"et vert"
"#;

    #[test]
    fn test_parse_info() {
        let info = parse_info(CATALOG).unwrap();
        assert_eq!(info.language, Some("fra".to_string()));
        assert_eq!(info.num_entries, 3);
        assert_eq!(info.num_translations, 2);
        assert_eq!(info.pct_translated(), 66);
    }

    #[test]
    fn test_parse_info_no_language() {
        let catalog = "msgid \"\"\nmsgstr \"\"\n\"MIME-Version: 1.0\\n\"\n";
        let info = parse_info(catalog).unwrap();
        assert_eq!(info.language, None);
        assert_eq!(info.num_entries, 0);
        assert_eq!(info.pct_translated(), 0);
    }

    #[test]
    fn test_parse_info_rejects_garbage() {
        assert!(parse_info("this is not a catalog").is_err());
        assert!(parse_info("msgstr \"orphan\"").is_err());
        assert!(parse_info("msgid \"unterminated").is_err());
    }
}
