// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use chrono::NaiveDate;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use library_circulation::{
    ActorId, BookId, CirculationConfig, CirculationDesk, CirculationError, Fine, FineId,
    FixedClock, MemoryStore, NewBook, NewMember, TracingAuditSink,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Library Circulation - Replay circulation desk CSV files
///
/// Reads desk events from a CSV file, applies them in order and outputs every
/// fine raised to stdout.
#[derive(Parser, Debug)]
#[command(name = "library-circulation")]
#[command(about = "Replays library desk events and reports fines", long_about = None)]
struct Args {
    /// Path to CSV file with desk events
    ///
    /// Expected format: action,date,student,barcode,title,fine
    /// Example: cargo run -- events.csv > fines.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Settings file layered under the LIBRARY_* environment
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Fine per overdue day, overriding the settings
    #[arg(long)]
    daily_rate: Option<Decimal>,

    /// Loan period in days, overriding the settings
    #[arg(long)]
    loan_period_days: Option<u32>,
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match CirculationConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            process::exit(1);
        }
    };
    if let Some(rate) = args.daily_rate {
        config.daily_rate = rate;
    }
    if let Some(days) = args.loan_period_days {
        config.loan_period_days = days;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid settings: {}", e);
        process::exit(1);
    }

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let fines = match replay_events(BufReader::new(file), &config) {
        Ok(fines) => fines,
        Err(e) => {
            eprintln!("Error replaying events: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_fines(&fines, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `action, date, student, barcode, title, fine`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    action: String,
    date: NaiveDate,
    #[serde(default)]
    student: String,
    #[serde(default)]
    barcode: String,
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    fine: Option<u32>,
}

/// A desk event ready to apply.
#[derive(Debug, PartialEq, Eq)]
enum DeskEvent {
    Member { student: String },
    Copy { barcode: String, title: String },
    Issue { student: String, barcode: String },
    Return { student: String, barcode: String },
    Pay(FineId),
    Waive(FineId),
}

impl CsvRecord {
    /// Returns `None` for unknown actions or missing required fields.
    fn into_event(self) -> Option<DeskEvent> {
        let present = |field: String| (!field.is_empty()).then_some(field);

        match self.action.to_lowercase().as_str() {
            "member" => Some(DeskEvent::Member {
                student: present(self.student)?,
            }),
            "copy" => Some(DeskEvent::Copy {
                barcode: present(self.barcode)?,
                title: present(self.title)?,
            }),
            "issue" => Some(DeskEvent::Issue {
                student: present(self.student)?,
                barcode: present(self.barcode)?,
            }),
            "return" => Some(DeskEvent::Return {
                student: present(self.student)?,
                barcode: present(self.barcode)?,
            }),
            "pay" => Some(DeskEvent::Pay(FineId(self.fine?))),
            "waive" => Some(DeskEvent::Waive(FineId(self.fine?))),
            _ => None,
        }
    }
}

/// Desk state for one replay: the desk plus the names it has seen.
struct Replay {
    desk: CirculationDesk<MemoryStore>,
    clock: Arc<FixedClock>,
    actor: ActorId,
    books: HashMap<String, BookId>,
    students: Vec<String>,
}

impl Replay {
    fn new(config: &CirculationConfig) -> Self {
        let clock = Arc::new(FixedClock::new(NaiveDate::MIN));
        let desk = CirculationDesk::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            Arc::new(TracingAuditSink),
            config,
        );
        Self {
            desk,
            clock,
            actor: ActorId::new("replay"),
            books: HashMap::new(),
            students: Vec::new(),
        }
    }

    fn apply(&mut self, date: NaiveDate, event: DeskEvent) -> Result<(), CirculationError> {
        self.clock.set(date);
        let actor = Some(&self.actor);

        match event {
            DeskEvent::Member { student } => {
                self.desk
                    .register_member(NewMember::with_student_id(student.as_str()))?;
                self.students.push(student);
            }
            DeskEvent::Copy { barcode, title } => {
                let book_id = match self.books.get(&title) {
                    Some(&book_id) => book_id,
                    None => {
                        let book = self.desk.register_book(NewBook::titled(title.as_str()))?;
                        self.books.insert(title, book.book_id);
                        book.book_id
                    }
                };
                self.desk.register_copy(book_id, &barcode)?;
            }
            DeskEvent::Issue { student, barcode } => {
                self.desk.issue(actor, &student, &barcode)?;
            }
            DeskEvent::Return { student, barcode } => {
                self.desk.return_copy(actor, &student, &barcode)?;
            }
            DeskEvent::Pay(fine_id) => {
                self.desk.pay_fine(actor, fine_id)?;
            }
            DeskEvent::Waive(fine_id) => {
                self.desk.waive_fine(actor, fine_id)?;
            }
        }
        Ok(())
    }

    /// Every fine raised during the replay, in fine id order.
    fn fines(&self) -> Result<Vec<Fine>, CirculationError> {
        let mut fines = Vec::new();
        for student in &self.students {
            fines.extend(self.desk.member_fines(student)?);
        }
        fines.sort_by_key(|fine| fine.fine_id);
        Ok(fines)
    }
}

/// Replay desk events from a CSV reader.
///
/// Rows are streamed and applied in file order, with the desk clock set to
/// each row's date. Malformed rows and rejected events are logged and
/// skipped.
///
/// # CSV Format
///
/// Expected columns: `action, date, student, barcode, title, fine`
/// - `action`: member, copy, issue, return, pay or waive
/// - `date`: ISO calendar date the event happened on
/// - `student`: Student id (member, issue, return)
/// - `barcode`: Copy barcode (copy, issue, return)
/// - `title`: Book title (copy)
/// - `fine`: Fine id (pay, waive)
///
/// # Example
///
/// ```csv
/// action,date,student,barcode,title,fine
/// member,2025-01-01,S1,,,
/// copy,2025-01-01,,B1,Dune,
/// issue,2025-01-01,S1,B1,,
/// return,2025-01-21,S1,B1,,
/// pay,2025-01-22,,,,1
/// ```
///
/// # Errors
///
/// Returns an error only if the recorded fines cannot be read back.
pub fn replay_events<R: Read>(
    reader: R,
    config: &CirculationConfig,
) -> Result<Vec<Fine>, CirculationError> {
    let mut replay = Replay::new(config);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(row, %error, "skipping malformed row");
                continue;
            }
        };
        let date = record.date;
        let Some(event) = record.into_event() else {
            tracing::warn!(row, "skipping incomplete event");
            continue;
        };
        if let Err(error) = replay.apply(date, event) {
            tracing::warn!(row, %error, "event rejected");
        }
    }

    replay.fines()
}

/// Output row for one fine.
#[derive(Debug, Serialize)]
struct FineRow {
    fine: FineId,
    issue: u32,
    member: u32,
    overdue_days: u32,
    daily_rate: Decimal,
    amount: Decimal,
    status: String,
}

impl From<&Fine> for FineRow {
    fn from(fine: &Fine) -> Self {
        Self {
            fine: fine.fine_id,
            issue: fine.issue_id.0,
            member: fine.member_id.0,
            overdue_days: fine.overdue_days,
            daily_rate: fine.daily_rate,
            amount: fine.amount,
            status: fine.status.to_string(),
        }
    }
}

/// Write fines to a CSV writer.
///
/// # CSV Format
///
/// Columns: `fine, issue, member, overdue_days, daily_rate, amount, status`
///
/// # Example
///
/// ```csv
/// fine,issue,member,overdue_days,daily_rate,amount,status
/// 1,1,1,5,10,50,UNPAID
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_fines<W: Write>(fines: &[Fine], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for fine in fines {
        wtr.serialize(FineRow::from(fine))?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use library_circulation::FineStatus;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const HEADER: &str = "action,date,student,barcode,title,fine\n";

    fn replay(rows: &str) -> Vec<Fine> {
        let csv = format!("{HEADER}{rows}");
        replay_events(Cursor::new(csv), &CirculationConfig::default()).unwrap()
    }

    #[test]
    fn on_time_return_raises_no_fine() {
        let fines = replay(
            "member,2025-01-01,S1,,,\n\
             copy,2025-01-01,,B1,Dune,\n\
             issue,2025-01-01,S1,B1,,\n\
             return,2025-01-16,S1,B1,,\n",
        );
        assert!(fines.is_empty());
    }

    #[test]
    fn late_return_raises_a_fine() {
        let fines = replay(
            "member,2025-01-01,S1,,,\n\
             copy,2025-01-01,,B1,Dune,\n\
             issue,2025-01-01,S1,B1,,\n\
             return,2025-01-21,S1,B1,,\n",
        );
        assert_eq!(fines.len(), 1);
        assert_eq!(fines[0].overdue_days, 5);
        assert_eq!(fines[0].amount, dec!(50));
        assert_eq!(fines[0].status, FineStatus::Unpaid);
    }

    #[test]
    fn payment_settles_the_fine() {
        let fines = replay(
            "member,2025-01-01,S1,,,\n\
             copy,2025-01-01,,B1,Dune,\n\
             issue,2025-01-01,S1,B1,,\n\
             return,2025-01-18,S1,B1,,\n\
             pay,2025-01-19,,,,1\n\
             waive,2025-01-20,,,,1\n",
        );
        assert_eq!(fines[0].status, FineStatus::Paid);
    }

    #[test]
    fn rejected_events_are_skipped() {
        let fines = replay(
            "member,2025-01-01,S1,,,\n\
             member,2025-01-01,S2,,,\n\
             copy,2025-01-01,,B1,Dune,\n\
             issue,2025-01-01,S1,B1,,\n\
             issue,2025-01-02,S2,B1,,\n\
             return,2025-01-30,S2,B1,,\n\
             return,2025-01-17,S1,B1,,\n",
        );
        assert_eq!(fines.len(), 1);
        assert_eq!(fines[0].overdue_days, 1);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let fines = replay(
            "member,not-a-date,S1,,,\n\
             teleport,2025-01-01,S1,B1,,\n\
             issue,2025-01-01,,B1,,\n",
        );
        assert!(fines.is_empty());
    }

    #[test]
    fn copies_with_the_same_title_share_a_book() {
        let csv = format!(
            "{HEADER}copy,2025-01-01,,B1,Dune,\ncopy,2025-01-01,,B2,Dune,\ncopy,2025-01-01,,B3,Emma,\n"
        );
        let mut replay = Replay::new(&CirculationConfig::default());
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .from_reader(Cursor::new(csv));
        for record in rdr.deserialize::<CsvRecord>() {
            let record = record.unwrap();
            let date = record.date;
            replay.apply(date, record.into_event().unwrap()).unwrap();
        }

        assert_eq!(replay.books.len(), 2);
        let dune = replay.books["Dune"];
        assert_eq!(replay.desk.copies_of_book(dune).unwrap().len(), 2);
    }

    #[test]
    fn write_fines_to_csv() {
        let fines = replay(
            "member,2025-01-01,S1,,,\n\
             copy,2025-01-01,,B1,Dune,\n\
             issue,2025-01-01,S1,B1,,\n\
             return,2025-01-19,S1,B1,,\n",
        );

        let mut output = Vec::new();
        write_fines(&fines, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("fine,issue,member,overdue_days,daily_rate,amount,status\n"));
        assert!(output.contains("1,1,1,3,10,30,UNPAID"));
    }
}
