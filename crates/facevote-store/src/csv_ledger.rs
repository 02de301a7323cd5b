//! Ballot ledger as a CSV file.
//!
//! Layout: a `NAME,VOTE,DATE,TIME` header written once when the file is
//! created or empty, then one row per ballot in append order. `DATE` is
//! `DD-MM-YYYY` and `TIME` is `HH:MM:SS`.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use facevote_core::types::{DATE_FORMAT, TIME_FORMAT};
use facevote_core::{Ballot, Choice, Identifier, LedgerBackend, StoreError};

pub const LEDGER_FILE: &str = "Votes.csv";
pub const HEADER: [&str; 4] = ["NAME", "VOTE", "DATE", "TIME"];

fn csv_err(e: csv::Error) -> StoreError {
    StoreError::backend("csv", e)
}

/// Append-only CSV ledger file.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `Votes.csv` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerBackend for CsvLedger {
    fn records(&self) -> Result<Vec<Ballot>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::Headers)
            .from_reader(file);

        let headers = reader.headers().map_err(csv_err)?.clone();
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        if !headers.iter().eq(HEADER.iter().copied()) {
            return Err(StoreError::Corrupt(format!(
                "{}: unexpected header {:?}",
                self.path.display(),
                headers
            )));
        }

        let mut ballots = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            ballots.push(parse_row(&record)?);
        }
        Ok(ballots)
    }

    fn append(&mut self, ballot: &Ballot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .terminator(Terminator::CRLF)
            .from_writer(file);
        if needs_header {
            writer.write_record(HEADER).map_err(csv_err)?;
        }
        writer
            .write_record([
                ballot.identifier.as_str(),
                ballot.choice.as_str(),
                ballot.date().as_str(),
                ballot.time().as_str(),
            ])
            .map_err(csv_err)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_data()?;

        tracing::debug!(path = %self.path.display(), header = needs_header, "ledger row appended");
        Ok(())
    }
}

fn parse_row(record: &StringRecord) -> Result<Ballot, StoreError> {
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let corrupt = |what: String| StoreError::Corrupt(format!("ledger line {line}: {what}"));

    let [name, vote, date, time] = [0, 1, 2, 3].map(|i| record.get(i));
    let (Some(name), Some(vote), Some(date), Some(time)) = (name, vote, date, time) else {
        return Err(corrupt(format!("expected 4 fields, got {}", record.len())));
    };

    let identifier = Identifier::parse(name).map_err(|e| corrupt(e.to_string()))?;
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| corrupt(format!("date {date:?}: {e}")))?;
    let time = NaiveTime::parse_from_str(time, TIME_FORMAT)
        .map_err(|e| corrupt(format!("time {time:?}: {e}")))?;

    Ok(Ballot {
        identifier,
        choice: Choice::new(vote),
        cast_at: date.and_time(time),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use facevote_core::receipt::ballot_digest;
    use facevote_core::{BallotLedger, FixedClock, VoteError};
    use tempfile::tempdir;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 19)
            .unwrap()
            .and_hms_opt(12, 0, 5)
            .unwrap()
    }

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    #[test]
    fn test_missing_file_has_no_ballots() {
        let dir = tempdir().unwrap();
        let ledger = CsvLedger::in_dir(dir.path());
        assert!(ledger.records().unwrap().is_empty());
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let mut ledger =
            BallotLedger::with_clock(CsvLedger::in_dir(dir.path()), FixedClock::new(noon()));
        ledger.cast(id("111111111111"), Choice::new("CONGRESS")).unwrap();
        ledger.cast(id("222222222222"), Choice::new("NOTA")).unwrap();

        let text = fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "NAME,VOTE,DATE,TIME",
                "111111111111,CONGRESS,19-04-2024,12:00:05",
                "222222222222,NOTA,19-04-2024,12:00:05",
            ]
        );
    }

    #[test]
    fn test_repeat_cast_rejected_across_reopen() {
        let dir = tempdir().unwrap();
        let mut ledger = BallotLedger::new(CsvLedger::in_dir(dir.path()));
        ledger.cast(id("111111111111"), Choice::new("CONGRESS")).unwrap();
        drop(ledger);

        let mut ledger = BallotLedger::new(CsvLedger::in_dir(dir.path()));
        assert!(ledger.has_voted(&id("111111111111")).unwrap());
        let err = ledger
            .cast(id("111111111111"), Choice::new("BJP"))
            .unwrap_err();
        assert!(matches!(err, VoteError::AlreadyVoted(_)));
        assert_eq!(ledger.ballots().unwrap().len(), 1);
    }

    #[test]
    fn test_reads_rows_written_elsewhere() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE);
        fs::write(
            &path,
            "NAME, VOTE, DATE, TIME\r\n123456789012,APB,01-01-2024,08:15:00\r\n",
        )
        .unwrap();
        let ballots = CsvLedger::new(&path).records().unwrap();
        assert_eq!(ballots.len(), 1);
        assert_eq!(ballots[0].choice.as_str(), "APB");
        assert_eq!(ballots[0].time(), "08:15:00");
    }

    #[test]
    fn test_choice_with_comma_round_trips() {
        let dir = tempdir().unwrap();
        let mut ledger =
            BallotLedger::with_clock(CsvLedger::in_dir(dir.path()), FixedClock::new(noon()));
        ledger
            .cast(id("111111111111"), Choice::new("Party, United"))
            .unwrap();
        let ballots = ledger.ballots().unwrap();
        assert_eq!(ballots[0].choice.as_str(), "Party, United");
    }

    #[test]
    fn test_choice_with_surrounding_spaces_kept_verbatim() {
        let dir = tempdir().unwrap();
        let mut ledger =
            BallotLedger::with_clock(CsvLedger::in_dir(dir.path()), FixedClock::new(noon()));
        let cast = ledger
            .cast(id("111111111111"), Choice::new(" Write In "))
            .unwrap();

        let read = ledger.ballots().unwrap();
        assert_eq!(read[0].choice, Choice::new(" Write In "));
        assert_eq!(ballot_digest(&read[0]), ballot_digest(&cast));

        let tally = ledger.tally().unwrap();
        assert_eq!(tally.get(&Choice::new(" Write In ")), Some(&1));
        assert_eq!(tally.get(&Choice::new("Write In")), None);
    }

    #[test]
    fn test_bad_date_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE);
        fs::write(&path, "NAME,VOTE,DATE,TIME\n123456789012,APB,2024-01-01,08:15:00\n").unwrap();
        assert!(matches!(
            CsvLedger::new(&path).records(),
            Err(StoreError::Corrupt(_))
        ));
    }
}
