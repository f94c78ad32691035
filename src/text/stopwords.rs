// Stopword providers.
//
// A stopword list is loaded once per run and never changes afterwards.
// Words are lower-cased on load so lookups can compare lower-cased tokens.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use stop_words::{get, LANGUAGE};
use tracing::info;

use crate::config::StopwordSettings;
use crate::error::PipelineError;

pub trait StopwordSource {
    fn load(&self) -> Result<HashSet<String>>;
}

/// Built-in list shipped with the stop-words crate.
pub struct BuiltinStopwords {
    pub language: String,
}

impl StopwordSource for BuiltinStopwords {
    fn load(&self) -> Result<HashSet<String>> {
        let language = match self.language.to_lowercase().as_str() {
            "english" => LANGUAGE::English,
            "spanish" => LANGUAGE::Spanish,
            "portuguese" => LANGUAGE::Portuguese,
            "french" => LANGUAGE::French,
            "german" => LANGUAGE::German,
            "italian" => LANGUAGE::Italian,
            other => {
                return Err(PipelineError::config(format!(
                    "no built-in stopword list for language '{other}'"
                ))
                .into())
            }
        };
        Ok(get(language).into_iter().map(|w| w.to_lowercase()).collect())
    }
}

/// Stopwords read from a file.
///
/// A `.csv` file must have a header row; words are taken from `column` and
/// every row must reach that column. Any other file is read as one word per
/// line. Blank lines are skipped.
pub struct FileStopwords {
    pub path: PathBuf,
    pub column: String,
}

impl StopwordSource for FileStopwords {
    fn load(&self) -> Result<HashSet<String>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::config(format!(
                "cannot read stopword file {}: {e}",
                self.path.display()
            ))
        })?;

        let words = if is_csv(&self.path) {
            csv_column(&content, &self.column).map_err(|reason| {
                PipelineError::config(format!("stopword file {}: {reason}", self.path.display()))
            })?
        } else {
            content
                .lines()
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .collect()
        };

        if words.is_empty() {
            return Err(PipelineError::config(format!(
                "stopword file {} is empty",
                self.path.display()
            ))
            .into());
        }
        Ok(words)
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Values of one column of a comma-separated file with a header row.
fn csv_column(content: &str, column: &str) -> Result<HashSet<String>, String> {
    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let Some((_, header)) = lines.next() else {
        return Err("missing header row".to_string());
    };
    let header = split_csv_line(header);
    let index = header
        .iter()
        .position(|h| h.eq_ignore_ascii_case(column))
        .ok_or_else(|| format!("no column '{column}'"))?;

    let mut words = HashSet::new();
    for (number, line) in lines {
        let fields = split_csv_line(line);
        let Some(word) = fields.get(index) else {
            return Err(format!(
                "line {} has {} fields, header has {}",
                number + 1,
                fields.len(),
                header.len()
            ));
        };
        if !word.is_empty() {
            words.insert(word.to_lowercase());
        }
    }
    Ok(words)
}

/// Split one CSV record. Inside double quotes a comma is data and `""` is a
/// literal quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// Pick the source named by the settings (a file wins over a language) and load it.
pub fn load_stopwords(settings: &StopwordSettings) -> Result<HashSet<String>> {
    let source: Box<dyn StopwordSource> = match (&settings.file, &settings.language) {
        (Some(path), _) => Box::new(FileStopwords {
            path: path.clone(),
            column: settings.column.clone(),
        }),
        (None, Some(language)) => Box::new(BuiltinStopwords {
            language: language.clone(),
        }),
        (None, None) => {
            return Err(PipelineError::config("stopwords: set either `file` or `language`").into())
        }
    };

    let words = source.load()?;
    info!(count = words.len(), "Loaded stopwords");
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_english_contains_common_words() {
        let words = BuiltinStopwords {
            language: "English".to_string(),
        }
        .load()
        .unwrap();
        assert!(words.contains("the"));
        assert!(words.contains("and"));
    }

    #[test]
    fn unknown_language_is_configuration_error() {
        let err = BuiltinStopwords {
            language: "klingon".to_string(),
        }
        .load()
        .unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
    }

    #[test]
    fn reads_csv_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stops.csv");
        std::fs::write(&path, "id,word\n1,De\n2,\"la\"\n3,\n").unwrap();
        let words = FileStopwords {
            path,
            column: "word".to_string(),
        }
        .load()
        .unwrap();
        assert_eq!(words, HashSet::from(["de".to_string(), "la".to_string()]));
    }

    #[test]
    fn quoted_commas_do_not_shift_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stops.csv");
        std::fs::write(
            &path,
            "\"note, free text\",word\n\"article, common\",el\n\"x\",de\n\"say \"\"hi\"\"\",\"lo, s\"\n",
        )
        .unwrap();
        let words = FileStopwords {
            path,
            column: "word".to_string(),
        }
        .load()
        .unwrap();
        assert_eq!(
            words,
            HashSet::from(["el".to_string(), "de".to_string(), "lo, s".to_string()])
        );
    }

    #[test]
    fn escaped_quotes_stay_in_the_field() {
        assert_eq!(
            split_csv_line(r#"1,"a ""b"" c",d"#),
            vec!["1", r#"a "b" c"#, "d"]
        );
    }

    #[test]
    fn short_csv_row_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stops.csv");
        std::fs::write(&path, "id,word\n1,el\n2\n").unwrap();
        let err = FileStopwords {
            path,
            column: "word".to_string(),
        }
        .load()
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Configuration { .. })
        ));
        assert!(err.to_string().contains("line 3"), "got {err}");
    }

    #[test]
    fn reads_plain_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stops.txt");
        std::fs::write(&path, "El\n\n los \n").unwrap();
        let words = FileStopwords {
            path,
            column: "word".to_string(),
        }
        .load()
        .unwrap();
        assert!(words.contains("el"));
        assert!(words.contains("los"));
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let settings = StopwordSettings {
            file: Some(PathBuf::from("/definitely/not/here.txt")),
            ..Default::default()
        };
        let err = load_stopwords(&settings).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Configuration { .. })
        ));
    }
}
