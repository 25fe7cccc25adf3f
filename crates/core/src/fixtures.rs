//! Shared test fixtures

use chrono::{DateTime, TimeZone, Utc};

use crate::roster::Roster;
use crate::storage::Database;

pub const ROSTER: &str = r#"
[[subject]]
code = "CS101"
name = "Data Structures"
department = "CS"
year = 2

[[subject]]
code = "CS201"
name = "Algorithms"
department = "CS"
year = 3

[[subject]]
code = "IT101"
name = "Web Development"
department = "IT"
year = 2

[[instructor]]
id = "teacher-1"
name = "Professor Wilson"
subjects = ["CS101", "CS201"]

[[instructor]]
id = "teacher-2"
name = "Professor Martinez"
subjects = ["IT101"]

[[student]]
id = "CS2001"
name = "John Smith"
department = "CS"
year = 2
subjects = ["CS101", "CS201"]

[[student]]
id = "CS2002"
name = "Sarah Johnson"
department = "CS"
year = 2
subjects = ["CS101", "CS201"]

[[student]]
id = "CS2003"
name = "Priya Patel"
department = "CS"
year = 2
subjects = ["CS101"]

[[student]]
id = "IT2001"
name = "Michael Lee"
department = "IT"
year = 2
subjects = ["IT101"]
"#;

/// 2024-06-10 09:00:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
}

pub fn roster() -> Roster {
    Roster::from_toml(ROSTER).unwrap()
}

/// In-memory database provisioned with the test roster
pub fn provisioned_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.provision(&roster()).unwrap();
    db
}
