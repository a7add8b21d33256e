use std::fmt;
use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, Local};
use prettytable::{row, Table};

use crate::service::Flavor;
use crate::status::HardwareStatus;

#[derive(Debug, Clone)]
/// Summary of one completed capture session
pub struct SessionReport {
    /// When the session was started
    pub started_at: DateTime<Local>,
    /// Version string reported by the library
    pub library_version: String,
    pub flavor: Flavor,
    /// Device serial, when the library reports one
    pub serial: Option<String>,
    /// Last hardware status observed
    pub status: HardwareStatus,
    pub captured: u64,
    pub decoded: u64,
    /// Decoded rows written to the output
    pub rows: u64,
    pub output: String,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn new(started_at: DateTime<Local>, library_version: String, flavor: Flavor) -> Self {
        SessionReport {
            started_at,
            library_version,
            flavor,
            serial: None,
            status: HardwareStatus::NotInitialized,
            captured: 0,
            decoded: 0,
            rows: 0,
            output: String::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn set_serial(&mut self, serial: Option<String>) {
        self.serial = serial;
    }
    pub fn set_status(&mut self, status: HardwareStatus) {
        self.status = status;
    }
    pub fn set_counts(&mut self, captured: u64, decoded: u64) {
        self.captured = captured;
        self.decoded = decoded;
    }
    pub fn set_rows(&mut self, rows: u64, output: String) {
        self.rows = rows;
        self.output = output;
    }
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    fn started(&self) -> String {
        self.started_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn to_formatted_table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(row!["Started", self.started()]);
        table.add_row(row!["Library", self.library_version]);
        table.add_row(row!["Flavor", self.flavor]);
        table.add_row(row!["Serial", self.serial.as_deref().unwrap_or("-")]);
        table.add_row(row!["Hardware", self.status]);
        table.add_row(row!["Captured", self.captured]);
        table.add_row(row!["Decoded", self.decoded]);
        table.add_row(row!["Rows", self.rows]);
        table.add_row(row!["Output", self.output]);
        table.add_row(row!["Elapsed", format!("{:.1}s", self.elapsed.as_secs_f64())]);
        table
    }
}

impl Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} library={} flavor={} serial={} status={} captured={} decoded={} rows={} output={}",
               self.started(),
               self.library_version,
               self.flavor,
               match self.serial {
                   Some(ref serial) => serial,
                   None => "-",
               },
               self.status,
               self.captured,
               self.decoded,
               self.rows,
               self.output)
    }
}
