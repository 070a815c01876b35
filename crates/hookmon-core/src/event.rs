use std::fmt::{self, Display};

use chrono::{DateTime, Local, TimeZone};
use nix::unistd::{Pid, getpid};
use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::util;

/// Category of an event record, written as the line prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Tag {
    FileActivity,
    FileCreate,
    FileDelete,
    FileWrite,
    Process,
    Ptrace,
}

/// One line on the event channel: `<TAG>:<body>`.
///
/// Most records are *stamped*, their body being
/// `<timestamp> (<pid>)  : <payload>`. A few are *bare* because the
/// controller parses their body directly (process ids, written bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    tag: Tag,
    body: String,
}

impl EventRecord {
    /// Stamped record for the calling process, at the current local time.
    pub fn stamped(tag: Tag, payload: impl Display) -> Self {
        Self::stamped_at(tag, &Local::now(), getpid(), payload)
    }

    pub fn stamped_at<Tz>(tag: Tag, time: &DateTime<Tz>, pid: Pid, payload: impl Display) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        Self {
            tag,
            body: format!("{} ({pid})  : {payload}", util::timestamp(time)),
        }
    }

    pub fn bare(tag: Tag, body: impl Into<String>) -> Self {
        Self {
            tag,
            body: body.into(),
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Wire representation, newline terminated.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.body)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;

    use super::*;

    #[test]
    fn tag_names() {
        assert_eq!(Tag::FileActivity.to_string(), "FILE_ACTIVITY");
        assert_eq!(Tag::FileCreate.to_string(), "FILE_CREATE");
        assert_eq!(Tag::FileDelete.to_string(), "FILE_DELETE");
        assert_eq!(Tag::FileWrite.to_string(), "FILE_WRITE");
        assert_eq!(Tag::Process.to_string(), "PROCESS");
        let ptrace: &'static str = Tag::Ptrace.into();
        assert_eq!(ptrace, "PTRACE");
        assert_eq!(Tag::from_str("FILE_DELETE"), Ok(Tag::FileDelete));
    }

    #[test]
    fn stamped_line() {
        let time = Utc.with_ymd_and_hms(2014, 3, 5, 9, 7, 2).unwrap();
        let record = EventRecord::stamped_at(
            Tag::FileActivity,
            &time,
            Pid::from_raw(321),
            "Read - /etc/hosts",
        );
        assert_eq!(
            record.to_line(),
            "FILE_ACTIVITY:Wed Mar  5 09:07:02 2014 (321)  : Read - /etc/hosts\n"
        );
    }

    #[test]
    fn stamped_with_empty_payload() {
        let time = Utc.with_ymd_and_hms(2014, 11, 20, 23, 59, 59).unwrap();
        let record = EventRecord::stamped_at(Tag::Ptrace, &time, Pid::from_raw(7), "");
        assert_eq!(record.to_string(), "PTRACE:Thu Nov 20 23:59:59 2014 (7)  : ");
    }

    #[test]
    fn bare_line() {
        let record = EventRecord::bare(Tag::Process, " 1234");
        assert_eq!(record.to_line(), "PROCESS: 1234\n");
        assert_eq!(record.tag(), Tag::Process);
        assert_eq!(record.body(), " 1234");
    }
}
