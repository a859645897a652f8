use log::{debug, info, warn};
use snafu::prelude::*;
use std::collections::HashSet;

use crate::config::*;

/// The column positions resolved from the header.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReshapePlan {
    pub id_column: Option<usize>,
    pub key_columns: Vec<(String, usize)>,
    pub question_columns: Vec<(String, usize)>,
}

/// Checks the configuration against the header and resolves all the columns.
///
/// Every named column must be present. A column cannot be both kept (as the
/// identifier or a key) and dropped. Key columns that repeat the identifier
/// are ignored. Without an identifier column, the header cannot already hold
/// a column named like the synthetic identifier. The identifier and the keys
/// cannot be named like the generated output columns.
pub fn plan(config: &ReshapeConfig, header: &[String]) -> SResult<ReshapePlan> {
    let find = |column: &String| -> SResult<usize> {
        header
            .iter()
            .position(|h| h == column)
            .context(MissingColumnSnafu { column })
    };

    let dropped: HashSet<&String> = config.drop_columns.iter().collect();
    for column in config.drop_columns.iter() {
        find(column)?;
    }

    let mut seen: HashSet<&String> = HashSet::new();
    for h in header.iter().filter(|h| !dropped.contains(h)) {
        if !seen.insert(h) {
            return DuplicateColumnSnafu { column: h }.fail();
        }
    }

    let reserved = |column: &String| -> SResult<()> {
        ensure!(
            !ReshapeConfig::RESERVED_COLUMNS.contains(&column.as_str()),
            ReservedColumnSnafu { column }
        );
        Ok(())
    };

    let id_column = match &config.unique_id_column {
        Some(column) => {
            ensure!(!dropped.contains(column), ConflictingColumnsSnafu { column });
            reserved(column)?;
            Some(find(column)?)
        }
        None => {
            let synthetic = ReshapeConfig::SYNTHETIC_ID_COLUMN;
            ensure!(
                !header
                    .iter()
                    .any(|h| h.as_str() == synthetic && !dropped.contains(h)),
                ReservedColumnSnafu { column: synthetic }
            );
            None
        }
    };

    let mut key_columns: Vec<(String, usize)> = Vec::new();
    for column in config.key_columns.iter() {
        ensure!(!dropped.contains(column), ConflictingColumnsSnafu { column });
        let idx = find(column)?;
        reserved(column)?;
        if Some(idx) == id_column || key_columns.iter().any(|(_, i)| *i == idx) {
            debug!("plan: ignoring repeated key column {:?}", column);
            continue;
        }
        key_columns.push((column.clone(), idx));
    }

    let question_columns: Vec<(String, usize)> = header
        .iter()
        .enumerate()
        .filter(|(idx, h)| {
            !dropped.contains(h)
                && Some(*idx) != id_column
                && !key_columns.iter().any(|(_, i)| i == idx)
        })
        .map(|(idx, h)| (h.clone(), idx))
        .collect();

    debug!(
        "plan: id: {:?} keys: {:?} questions: {:?}",
        id_column, key_columns, question_columns
    );

    Ok(ReshapePlan {
        id_column,
        key_columns,
        question_columns,
    })
}

/// Melts a wide table into one record per (respondent, question).
///
/// Blank answers (missing, or only whitespace) are left out. The records of a
/// respondent are contiguous and follow the order of the columns.
pub fn reshape(table: &WideTable, config: &ReshapeConfig) -> SResult<Vec<LongRecord>> {
    let p = plan(config, &table.header)?;
    let mut res: Vec<LongRecord> = Vec::new();
    let mut num_blanks: usize = 0;

    for (row_idx, row) in table.rows.iter().enumerate() {
        let cell = |idx: usize| -> Option<&String> { row.get(idx).and_then(|c| c.as_ref()) };

        let unique_id = match p.id_column {
            Some(idx) => match cell(idx) {
                Some(s) => s.clone(),
                None => {
                    warn!("reshape: row {}: missing identifier", row_idx);
                    String::new()
                }
            },
            None => row_idx.to_string(),
        };

        let slicer_values: Vec<(String, String)> = p
            .key_columns
            .iter()
            .map(|(name, idx)| (name.clone(), cell(*idx).cloned().unwrap_or_default()))
            .collect();

        for (question, idx) in p.question_columns.iter() {
            match cell(*idx) {
                Some(response) if !response.trim().is_empty() => {
                    res.push(LongRecord {
                        unique_id: unique_id.clone(),
                        slicer_values: slicer_values.clone(),
                        question: question.clone(),
                        response: response.clone(),
                    });
                }
                _ => {
                    num_blanks += 1;
                }
            }
        }
    }

    info!(
        "reshape: {} rows, {} questions: {} records, {} blank answers left out",
        table.rows.len(),
        p.question_columns.len(),
        res.len(),
        num_blanks
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(x: &str) -> String {
        x.to_string()
    }

    fn cells(xs: &[&str]) -> Vec<Option<String>> {
        xs.iter()
            .map(|x| if x.is_empty() { None } else { Some(s(x)) })
            .collect()
    }

    fn survey() -> WideTable {
        let mut t = WideTable::new(vec![s("Email"), s("Team"), s("Grade"), s("Q1"), s("Q2")]);
        t.push_row(cells(&["a@x.org", "Red", "G1", "I love this!", "Too slow"]));
        t.push_row(cells(&["b@x.org", "Blue", "G2", "", "Fine"]));
        t.push_row(cells(&["c@x.org", "Red", "G1", "  ", "Great support"]));
        t
    }

    #[test]
    fn synthetic_ids_follow_source_order() {
        let config = ReshapeConfig {
            drop_columns: vec![s("Email"), s("Team"), s("Grade"), s("Q2")],
            ..ReshapeConfig::default()
        };
        let mut t = WideTable::new(vec![s("Email"), s("Team"), s("Grade"), s("Q1"), s("Q2")]);
        t.push_row(cells(&["a", "R", "G", "one", ""]));
        t.push_row(cells(&["b", "R", "G", "two", ""]));
        t.push_row(cells(&["c", "R", "G", "three", ""]));
        let records = reshape(&t, &config).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.unique_id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
        assert_eq!(config.id_column_name(), "uID");
    }

    #[test]
    fn blank_answers_are_filtered() {
        let config = ReshapeConfig {
            unique_id_column: Some(s("Email")),
            key_columns: vec![s("Team"), s("Grade")],
            drop_columns: vec![],
        };
        let records = reshape(&survey(), &config).unwrap();
        // 3 rows x 2 questions, minus one missing and one whitespace-only answer.
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| !r.response.trim().is_empty()));
        let questions: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.unique_id.as_str(), r.question.as_str()))
            .collect();
        assert_eq!(
            questions,
            vec![
                ("a@x.org", "Q1"),
                ("a@x.org", "Q2"),
                ("b@x.org", "Q2"),
                ("c@x.org", "Q2")
            ]
        );
    }

    #[test]
    fn key_values_follow_their_source_row() {
        let config = ReshapeConfig {
            unique_id_column: Some(s("Email")),
            key_columns: vec![s("Grade"), s("Team")],
            drop_columns: vec![],
        };
        let table = survey();
        let records = reshape(&table, &config).unwrap();
        for r in records.iter() {
            let row = table
                .rows
                .iter()
                .find(|row| row[0].as_deref() == Some(r.unique_id.as_str()))
                .unwrap();
            assert_eq!(
                r.slicer_values,
                vec![
                    (s("Grade"), row[2].clone().unwrap()),
                    (s("Team"), row[1].clone().unwrap())
                ]
            );
        }
    }

    #[test]
    fn dropped_columns_are_not_questions() {
        let config = ReshapeConfig {
            unique_id_column: Some(s("Email")),
            key_columns: vec![s("Team")],
            drop_columns: vec![s("Grade"), s("Q2")],
        };
        let p = plan(&config, &survey().header).unwrap();
        assert_eq!(p.question_columns, vec![(s("Q1"), 3)]);
        let records = reshape(&survey(), &config).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].slicer_values, vec![(s("Team"), s("Red"))]);
    }

    #[test]
    fn every_other_column_is_a_question() {
        let config = ReshapeConfig::default();
        let p = plan(&config, &survey().header).unwrap();
        assert_eq!(p.id_column, None);
        assert_eq!(p.question_columns.len(), 5);
    }

    #[test]
    fn missing_columns_are_config_errors() {
        let header = survey().header;
        for config in [
            ReshapeConfig {
                unique_id_column: Some(s("Id")),
                ..ReshapeConfig::default()
            },
            ReshapeConfig {
                key_columns: vec![s("Department")],
                ..ReshapeConfig::default()
            },
            ReshapeConfig {
                drop_columns: vec![s("Timestamp")],
                ..ReshapeConfig::default()
            },
        ] {
            let err = plan(&config, &header).unwrap_err();
            assert!(matches!(err, SentimentError::MissingColumn { .. }));
            assert_eq!(err.kind(), ErrorKind::Config);
        }
    }

    #[test]
    fn kept_and_dropped_column_conflict() {
        let config = ReshapeConfig {
            unique_id_column: None,
            key_columns: vec![s("Team")],
            drop_columns: vec![s("Team")],
        };
        let err = plan(&config, &survey().header).unwrap_err();
        assert!(matches!(err, SentimentError::ConflictingColumns { .. }));
    }

    #[test]
    fn duplicate_header_is_rejected_unless_dropped() {
        let header = vec![s("Id"), s("Q"), s("Q")];
        let err = plan(&ReshapeConfig::default(), &header).unwrap_err();
        assert!(matches!(err, SentimentError::DuplicateColumn { .. }));

        let config = ReshapeConfig {
            drop_columns: vec![s("Q")],
            ..ReshapeConfig::default()
        };
        assert!(plan(&config, &header).is_ok());
    }

    #[test]
    fn identifier_repeated_as_key_is_ignored() {
        let config = ReshapeConfig {
            unique_id_column: Some(s("Email")),
            key_columns: vec![s("Email"), s("Team"), s("Team")],
            drop_columns: vec![],
        };
        let p = plan(&config, &survey().header).unwrap();
        assert_eq!(p.key_columns, vec![(s("Team"), 1)]);
    }

    #[test]
    fn existing_synthetic_id_column_is_rejected() {
        let mut t = WideTable::new(vec![s("uID"), s("Q1")]);
        t.push_row(cells(&["alice", "Great"]));
        let err = reshape(&t, &ReshapeConfig::default()).unwrap_err();
        assert!(matches!(err, SentimentError::ReservedColumn { .. }));
        assert_eq!(err.kind(), ErrorKind::Config);

        // Fine once the column is the identifier, or dropped.
        let config = ReshapeConfig {
            unique_id_column: Some(s("uID")),
            ..ReshapeConfig::default()
        };
        let records = reshape(&t, &config).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].unique_id, "alice");
        assert_eq!(records[0].question, "Q1");

        let config = ReshapeConfig {
            drop_columns: vec![s("uID")],
            ..ReshapeConfig::default()
        };
        let records = reshape(&t, &config).unwrap();
        assert!(records.iter().all(|r| r.question != "uID"));
        assert_eq!(records[0].unique_id, "0");
    }

    #[test]
    fn output_column_names_are_reserved() {
        let header = vec![s("Email"), s("Question"), s("Type"), s("Q1")];
        for config in [
            ReshapeConfig {
                unique_id_column: Some(s("Question")),
                ..ReshapeConfig::default()
            },
            ReshapeConfig {
                unique_id_column: Some(s("Email")),
                key_columns: vec![s("Type")],
                ..ReshapeConfig::default()
            },
        ] {
            let err = plan(&config, &header).unwrap_err();
            assert!(matches!(err, SentimentError::ReservedColumn { .. }));
        }

        // As questions, these names are only values of the Question column.
        let config = ReshapeConfig {
            unique_id_column: Some(s("Email")),
            ..ReshapeConfig::default()
        };
        assert_eq!(plan(&config, &header).unwrap().question_columns.len(), 3);
    }

    #[test]
    fn reshape_is_deterministic() {
        let config = ReshapeConfig {
            unique_id_column: Some(s("Email")),
            key_columns: vec![s("Team")],
            drop_columns: vec![],
        };
        assert_eq!(
            reshape(&survey(), &config).unwrap(),
            reshape(&survey(), &config).unwrap()
        );
    }
}
