use crate::backend::RemoteProcedures;

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecord {
    pub line: usize,
    pub name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportFailure {
    pub line: usize,
    pub label: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportReport {
    pub succeeded: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Parse `name,username,password` lines; the first line is a header.
///
/// Malformed lines come back as failures so they are counted like rejected rows.
pub fn parse_csv(content: &str) -> (Vec<TeamRecord>, Vec<ImportFailure>) {
    let mut records = Vec::new();
    let mut failures = Vec::new();

    for (idx, raw) in content.lines().enumerate().skip(1) {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
        match fields.as_slice() {
            [name, username, password, ..] if !name.is_empty() && !username.is_empty() && !password.is_empty() => {
                records.push(TeamRecord {
                    line,
                    name: name.to_string(),
                    username: username.to_string(),
                    password: password.to_string(),
                });
            }
            _ => failures.push(ImportFailure {
                line,
                label: malformed_label(line, fields.first().copied().unwrap_or_default()),
                reason: "expected name,username,password".to_string(),
            }),
        }
    }

    (records, failures)
}

/// Names a rejected line by number and team name only; the rest may hold a password.
fn malformed_label(line: usize, name: &str) -> String {
    if name.is_empty() {
        format!("line {}", line)
    } else {
        format!("line {} ({})", line, name)
    }
}

/// Create each team through the import procedure, one call per row.
pub async fn import_teams(rpc: &dyn RemoteProcedures, content: &str) -> ImportReport {
    let (records, failures) = parse_csv(content);
    let mut report = ImportReport {
        succeeded: 0,
        failures,
    };

    tracing::info!("Importing {} team(s)", records.len());

    for record in records {
        let label = format!("{} ({})", record.username, record.name);
        match rpc
            .insert_team_with_password(&record.name, &record.username, &record.password)
            .await
        {
            Ok(outcome) if outcome.success => {
                tracing::debug!("Imported {}", label);
                report.succeeded += 1;
            }
            Ok(outcome) => {
                let reason = outcome.error.unwrap_or_else(|| "rejected".to_string());
                tracing::warn!("Skipped {}: {}", label, reason);
                report.failures.push(ImportFailure {
                    line: record.line,
                    label,
                    reason,
                });
            }
            Err(e) => {
                tracing::warn!("Import of {} failed: {}", label, e);
                report.failures.push(ImportFailure {
                    line: record.line,
                    label,
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}
