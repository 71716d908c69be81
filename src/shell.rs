//! Line-oriented command shell over [`BookingService`].
//!
//! One command per line, whitespace separated, ids as ULIDs, dates as
//! `YYYY-MM-DD` and times as `HH:MM`. Every command answers with one JSON
//! object: `{"ok": ...}` or `{"error": {"kind": ..., "message": ...}}`.

use std::str::SplitWhitespace;
use std::sync::Arc;

use chrono::{Days, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use ulid::Ulid;

use crate::engine::{BookingError, BookingService};
use crate::limits::{MAX_INTERVAL_MINUTES, MAX_QUERY_DAYS};
use crate::model::*;

pub const HELP: &str = "\
trainer add <first> <last> <speciality> | trainer list | trainer schedule <trainer>
room add <name> <capacity> | room open|close <room> | room list | room bookings <room>
member add <first> <last> <email> | member find <text...>
slot add <trainer> <date> <from> <to> [available|unavailable] | slot remove <slot>
slot list <trainer> <from-date> [to-date]
free <trainer> [from-date] [days] [min-minutes]
session book <trainer> <room> <member> <date> <from> <to>
session move <session> [<date> <from> <to>] [trainer=<id>] [room=<id>]
session cancel|complete <session>
session list member|trainer <id> [after-date]
class create <trainer> <room> <date> <from> <to> <capacity> <name...>
class enroll|leave <class> <member> | class cancel|complete <class>
class list [open] [all] [trainer=<id>] [room=<id>] [from=<date>] [to=<date>]
class roster <class>
booking <id> | purge | help";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid {name}: {value}")]
    InvalidArgument { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddTrainer { first_name: String, last_name: String, speciality: String },
    ListTrainers,
    TrainerSchedule(TrainerId),
    AddRoom { name: String, capacity: u32 },
    SetRoomAvailable { room_id: RoomId, available: bool },
    ListRooms,
    RoomBookings(RoomId),
    AddMember { first_name: String, last_name: String, email: String },
    FindMembers(String),
    AddSlot { trainer_id: TrainerId, date: NaiveDate, interval: TimeInterval, status: SlotStatus },
    RemoveSlot(SlotId),
    ListSlots { trainer_id: TrainerId, from: NaiveDate, to: Option<NaiveDate> },
    FreeWindows { trainer_id: TrainerId, from: Option<NaiveDate>, days: Option<u32>, min_minutes: i64 },
    BookSession { trainer_id: TrainerId, room_id: RoomId, member_id: MemberId, interval: TimeInterval },
    RescheduleSession { session_id: BookingId, change: SessionChange },
    CancelSession(BookingId),
    CompleteSession(BookingId),
    UpcomingSessions { party: Party, after: Option<NaiveDate> },
    CreateClass { trainer_id: TrainerId, room_id: RoomId, interval: TimeInterval, capacity: u32, name: String },
    Enroll { class_id: BookingId, member_id: MemberId },
    Unenroll { class_id: BookingId, member_id: MemberId },
    CancelClass(BookingId),
    CompleteClass(BookingId),
    ListClasses(ClassFilter),
    Roster(BookingId),
    GetBooking(BookingId),
    Purge,
    Help,
}

struct Args<'a> {
    tokens: SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next(&mut self, name: &'static str) -> Result<&'a str, ShellError> {
        self.tokens.next().ok_or(ShellError::MissingArgument(name))
    }

    fn ulid(&mut self, name: &'static str) -> Result<Ulid, ShellError> {
        parse_ulid(name, self.next(name)?)
    }

    fn date(&mut self, name: &'static str) -> Result<NaiveDate, ShellError> {
        parse_date(name, self.next(name)?)
    }

    fn number<T: std::str::FromStr>(&mut self, name: &'static str) -> Result<T, ShellError> {
        parse_number(name, self.next(name)?)
    }

    /// `<date> <from> <to>` as an interval on that date.
    fn interval(&mut self) -> Result<(NaiveDate, TimeInterval), ShellError> {
        let date = self.date("date")?;
        let start = parse_time("from", self.next("from")?)?;
        let end = parse_time("to", self.next("to")?)?;
        Ok((date, on_date(date, start, end)?))
    }

    fn rest(&mut self) -> Vec<&'a str> {
        self.tokens.by_ref().collect()
    }
}

fn invalid(name: &'static str, value: &str) -> ShellError {
    ShellError::InvalidArgument {
        name,
        value: value.to_owned(),
    }
}

fn parse_ulid(name: &'static str, value: &str) -> Result<Ulid, ShellError> {
    Ulid::from_string(value).map_err(|_| invalid(name, value))
}

fn parse_date(name: &'static str, value: &str) -> Result<NaiveDate, ShellError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid(name, value))
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ShellError> {
    value.parse().map_err(|_| invalid(name, value))
}

/// `HH:MM`, with `24:00` meaning the following midnight.
fn parse_time(name: &'static str, value: &str) -> Result<Option<NaiveTime>, ShellError> {
    if value == "24:00" {
        return Ok(None);
    }
    NaiveTime::parse_from_str(value, "%H:%M")
        .map(Some)
        .map_err(|_| invalid(name, value))
}

fn on_date(
    date: NaiveDate,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
) -> Result<TimeInterval, ShellError> {
    let at = |t: Option<NaiveTime>| match t {
        Some(t) => Ok(date.and_time(t)),
        None => date
            .succ_opt()
            .map(|next| next.and_time(NaiveTime::MIN))
            .ok_or_else(|| invalid("date", &date.to_string())),
    };
    // Order is left to the service, which rejects reversed intervals with a typed error.
    Ok(TimeInterval {
        start: at(start)?,
        end: at(end)?,
    })
}

/// A number in `min..=max`.
fn parse_bounded(name: &'static str, value: &str, min: i64, max: i64) -> Result<i64, ShellError> {
    let n: i64 = parse_number(name, value)?;
    if (min..=max).contains(&n) {
        Ok(n)
    } else {
        Err(invalid(name, value))
    }
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>, ShellError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut args = Args {
        tokens: line.split_whitespace(),
    };
    let head = args.next("command")?;
    let command = match head {
        "help" => Command::Help,
        "purge" => Command::Purge,
        "booking" => Command::GetBooking(args.ulid("booking id")?),
        "free" => parse_free(&mut args)?,
        "trainer" | "room" | "member" | "slot" | "session" | "class" => {
            let verb = args.next("subcommand")?;
            parse_entity(head, verb, &mut args)?
        }
        other => return Err(ShellError::UnknownCommand(other.to_owned())),
    };
    Ok(Some(command))
}

fn parse_free(args: &mut Args<'_>) -> Result<Command, ShellError> {
    let trainer_id = args.ulid("trainer id")?;
    let rest = args.rest();
    let from = rest.first().map(|v| parse_date("from-date", v)).transpose()?;
    let days = rest
        .get(1)
        .map(|v| parse_bounded("days", v, 1, MAX_QUERY_DAYS).map(|d| d as u32))
        .transpose()?;
    let min_minutes = match rest.get(2) {
        Some(v) => parse_bounded("min-minutes", v, 0, MAX_INTERVAL_MINUTES)?,
        None => 30,
    };
    Ok(Command::FreeWindows {
        trainer_id,
        from,
        days,
        min_minutes,
    })
}

fn parse_entity(entity: &str, verb: &str, args: &mut Args<'_>) -> Result<Command, ShellError> {
    let command = match (entity, verb) {
        ("trainer", "add") => Command::AddTrainer {
            first_name: args.next("first name")?.to_owned(),
            last_name: args.next("last name")?.to_owned(),
            speciality: args.rest().join(" "),
        },
        ("trainer", "list") => Command::ListTrainers,
        ("trainer", "schedule") => Command::TrainerSchedule(args.ulid("trainer id")?),

        ("room", "add") => Command::AddRoom {
            name: args.next("name")?.to_owned(),
            capacity: args.number("capacity")?,
        },
        ("room", "open") | ("room", "close") => Command::SetRoomAvailable {
            room_id: args.ulid("room id")?,
            available: verb == "open",
        },
        ("room", "list") => Command::ListRooms,
        ("room", "bookings") => Command::RoomBookings(args.ulid("room id")?),

        ("member", "add") => Command::AddMember {
            first_name: args.next("first name")?.to_owned(),
            last_name: args.next("last name")?.to_owned(),
            email: args.next("email")?.to_owned(),
        },
        ("member", "find") => {
            let text = args.rest().join(" ");
            if text.is_empty() {
                return Err(ShellError::MissingArgument("search text"));
            }
            Command::FindMembers(text)
        }

        ("slot", "add") => {
            let trainer_id = args.ulid("trainer id")?;
            let (date, interval) = args.interval()?;
            let status = match args.tokens.next() {
                None | Some("available") => SlotStatus::Available,
                Some("unavailable") => SlotStatus::Unavailable,
                Some(other) => return Err(invalid("status", other)),
            };
            Command::AddSlot {
                trainer_id,
                date,
                interval,
                status,
            }
        }
        ("slot", "remove") => Command::RemoveSlot(args.ulid("slot id")?),
        ("slot", "list") => Command::ListSlots {
            trainer_id: args.ulid("trainer id")?,
            from: args.date("from-date")?,
            to: args.tokens.next().map(|v| parse_date("to-date", v)).transpose()?,
        },

        ("session", "book") => {
            let trainer_id = args.ulid("trainer id")?;
            let room_id = args.ulid("room id")?;
            let member_id = args.ulid("member id")?;
            let (_, interval) = args.interval()?;
            Command::BookSession {
                trainer_id,
                room_id,
                member_id,
                interval,
            }
        }
        ("session", "move") => parse_reschedule(args)?,
        ("session", "cancel") => Command::CancelSession(args.ulid("session id")?),
        ("session", "complete") => Command::CompleteSession(args.ulid("session id")?),
        ("session", "list") => {
            let party = match args.next("member|trainer")? {
                "member" => Party::Member(args.ulid("member id")?),
                "trainer" => Party::Trainer(args.ulid("trainer id")?),
                other => return Err(invalid("party", other)),
            };
            let after = args.tokens.next().map(|v| parse_date("after-date", v)).transpose()?;
            Command::UpcomingSessions { party, after }
        }

        ("class", "create") => {
            let trainer_id = args.ulid("trainer id")?;
            let room_id = args.ulid("room id")?;
            let (_, interval) = args.interval()?;
            let capacity = args.number("capacity")?;
            let name = args.rest().join(" ");
            if name.is_empty() {
                return Err(ShellError::MissingArgument("name"));
            }
            Command::CreateClass {
                trainer_id,
                room_id,
                interval,
                capacity,
                name,
            }
        }
        ("class", "enroll") => Command::Enroll {
            class_id: args.ulid("class id")?,
            member_id: args.ulid("member id")?,
        },
        ("class", "leave") => Command::Unenroll {
            class_id: args.ulid("class id")?,
            member_id: args.ulid("member id")?,
        },
        ("class", "cancel") => Command::CancelClass(args.ulid("class id")?),
        ("class", "complete") => Command::CompleteClass(args.ulid("class id")?),
        ("class", "list") => Command::ListClasses(parse_class_filter(args)?),
        ("class", "roster") => Command::Roster(args.ulid("class id")?),

        _ => return Err(ShellError::UnknownCommand(format!("{entity} {verb}"))),
    };
    Ok(command)
}

fn parse_reschedule(args: &mut Args<'_>) -> Result<Command, ShellError> {
    let session_id = args.ulid("session id")?;
    let mut change = SessionChange::default();
    let mut positional = Vec::new();
    for token in args.rest() {
        match token.split_once('=') {
            Some(("trainer", v)) => change.trainer_id = Some(parse_ulid("trainer id", v)?),
            Some(("room", v)) => change.room_id = Some(parse_ulid("room id", v)?),
            Some(_) => return Err(invalid("option", token)),
            None => positional.push(token),
        }
    }
    match positional.as_slice() {
        [] => {}
        [date, from, to] => {
            let date = parse_date("date", date)?;
            change.interval = Some(on_date(date, parse_time("from", from)?, parse_time("to", to)?)?);
        }
        _ => return Err(ShellError::MissingArgument("<date> <from> <to>")),
    }
    Ok(Command::RescheduleSession { session_id, change })
}

fn parse_class_filter(args: &mut Args<'_>) -> Result<ClassFilter, ShellError> {
    let mut filter = ClassFilter::default();
    let (mut from, mut to) = (None, None);
    for token in args.rest() {
        match token.split_once('=') {
            None if token == "open" => filter.open_only = true,
            None if token == "all" => filter.include_cancelled = true,
            Some(("trainer", v)) => filter.trainer_id = Some(parse_ulid("trainer id", v)?),
            Some(("room", v)) => filter.room_id = Some(parse_ulid("room id", v)?),
            Some(("from", v)) => from = Some(parse_date("from-date", v)?),
            Some(("to", v)) => to = Some(parse_date("to-date", v)?),
            _ => return Err(invalid("filter", token)),
        }
    }
    filter.dates = match (from, to) {
        (None, None) => None,
        (Some(from), to) => Some(DateRange {
            from,
            to: to.unwrap_or(from),
        }),
        (None, Some(to)) => Some(DateRange { from: to, to }),
    };
    Ok(filter)
}

/// Executes parsed commands and renders results as JSON.
pub struct Shell {
    service: Arc<BookingService>,
    suggestion_days: u32,
}

fn ok<T: Serialize>(result: Result<T, BookingError>) -> Value {
    match result {
        Ok(value) => json!({ "ok": value }),
        Err(e) => json!({ "error": { "kind": e.kind(), "message": e.to_string() } }),
    }
}

impl Shell {
    pub fn new(service: Arc<BookingService>, suggestion_days: u32) -> Self {
        Self {
            service,
            suggestion_days,
        }
    }

    /// Parse and run one line. `None` for blank lines and comments.
    pub async fn run_line(&self, line: &str) -> Option<Value> {
        match parse_line(line) {
            Ok(Some(command)) => Some(self.execute(command).await),
            Ok(None) => None,
            Err(e) => Some(json!({ "error": { "kind": "parse", "message": e.to_string() } })),
        }
    }

    pub async fn execute(&self, command: Command) -> Value {
        let svc = &self.service;
        match command {
            Command::Help => json!({ "ok": HELP }),
            Command::AddTrainer {
                first_name,
                last_name,
                speciality,
            } => ok(svc.register_trainer(&first_name, &last_name, &speciality).await),
            Command::ListTrainers => ok(Ok(svc.list_trainers())),
            Command::TrainerSchedule(id) => ok(svc.trainer_schedule(id).await),
            Command::AddRoom { name, capacity } => ok(svc.register_room(&name, capacity).await),
            Command::SetRoomAvailable { room_id, available } => {
                ok(svc.set_room_available(room_id, available).await)
            }
            Command::ListRooms => ok(Ok(svc.list_rooms())),
            Command::RoomBookings(id) => ok(svc.room_bookings(id).await),
            Command::AddMember {
                first_name,
                last_name,
                email,
            } => ok(svc.register_member(&first_name, &last_name, &email).await),
            Command::FindMembers(text) => ok(Ok(svc.search_members(&text))),
            Command::AddSlot {
                trainer_id,
                date,
                interval,
                status,
            } => ok(svc.set_availability(trainer_id, date, interval, status).await),
            Command::RemoveSlot(id) => ok(svc.remove_slot(id).await),
            Command::ListSlots { trainer_id, from, to } => {
                let range = DateRange::new(from, to.unwrap_or(from));
                ok(range
                    .and_then(|r| svc.list_available_slots(trainer_id, r))
                    .map(|slots| slots.iter().cloned().collect::<Vec<_>>()))
            }
            Command::FreeWindows {
                trainer_id,
                from,
                days,
                min_minutes,
            } => {
                let from = from.unwrap_or_else(|| Local::now().date_naive());
                let days = days.unwrap_or(self.suggestion_days).max(1);
                let range = from
                    .checked_add_days(Days::new(u64::from(days) - 1))
                    .ok_or(BookingError::LimitExceeded("query window past the last supported date"))
                    .and_then(|to| DateRange::new(from, to));
                let min_duration = Duration::try_minutes(min_minutes)
                    .ok_or(BookingError::LimitExceeded("minimum window duration"));
                ok(range.and_then(|r| svc.free_windows(trainer_id, r, min_duration?)))
            }
            Command::BookSession {
                trainer_id,
                room_id,
                member_id,
                interval,
            } => ok(svc.book_session(trainer_id, room_id, member_id, interval).await),
            Command::RescheduleSession { session_id, change } => {
                ok(svc.reschedule_session(session_id, change).await)
            }
            Command::CancelSession(id) => ok(svc.cancel_session(id).await),
            Command::CompleteSession(id) => ok(svc.complete_session(id).await),
            Command::UpcomingSessions { party, after } => {
                let after: NaiveDateTime = match after {
                    Some(date) => date.and_time(NaiveTime::MIN),
                    None => Local::now().naive_local(),
                };
                ok(svc.list_upcoming_sessions(party, after))
            }
            Command::CreateClass {
                trainer_id,
                room_id,
                interval,
                capacity,
                name,
            } => ok(svc.create_class(trainer_id, room_id, interval, capacity, &name).await),
            Command::Enroll { class_id, member_id } => {
                ok(svc.register_for_class(class_id, member_id).await)
            }
            Command::Unenroll { class_id, member_id } => ok(svc.unenroll(class_id, member_id).await),
            Command::CancelClass(id) => ok(svc.cancel_class(id).await),
            Command::CompleteClass(id) => ok(svc.complete_class(id).await),
            Command::ListClasses(filter) => ok(svc.list_classes(&filter)),
            Command::Roster(id) => ok(svc.class_roster(id)),
            Command::GetBooking(id) => ok(svc.get_booking(id)),
            Command::Purge => ok(svc.purge_cancelled().await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyHub;
    use crate::repository::MemoryRepository;

    const D: &str = "2024-01-10";

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(parse_line("# setup"), Ok(None));
    }

    #[test]
    fn parses_session_booking() {
        let (t, r, m) = (Ulid::new(), Ulid::new(), Ulid::new());
        let cmd = parse_line(&format!("session book {t} {r} {m} {D} 10:00 11:00")).unwrap();
        assert_eq!(
            cmd,
            Some(Command::BookSession {
                trainer_id: t,
                room_id: r,
                member_id: m,
                interval: span(D, "10:00", "11:00"),
            })
        );
    }

    #[test]
    fn slot_until_midnight() {
        let t = Ulid::new();
        let Some(Command::AddSlot { interval, status, .. }) =
            parse_line(&format!("slot add {t} {D} 20:00 24:00 unavailable")).unwrap()
        else {
            panic!("expected slot add");
        };
        assert_eq!(interval, TimeInterval::new(at(D, "20:00"), at("2024-01-11", "00:00")));
        assert_eq!(status, SlotStatus::Unavailable);
    }

    #[test]
    fn parses_reschedule_options() {
        let (s, r) = (Ulid::new(), Ulid::new());
        let cmd = parse_line(&format!("session move {s} room={r} {D} 12:00 13:00")).unwrap();
        assert_eq!(
            cmd,
            Some(Command::RescheduleSession {
                session_id: s,
                change: SessionChange {
                    trainer_id: None,
                    room_id: Some(r),
                    interval: Some(span(D, "12:00", "13:00")),
                },
            })
        );
        assert_eq!(
            parse_line(&format!("session move {s} {D} 12:00")),
            Err(ShellError::MissingArgument("<date> <from> <to>"))
        );
    }

    #[test]
    fn parses_class_creation_and_filters() {
        let (t, r) = (Ulid::new(), Ulid::new());
        let Some(Command::CreateClass { name, capacity, .. }) =
            parse_line(&format!("class create {t} {r} {D} 18:00 19:00 12 Morning Flow")).unwrap()
        else {
            panic!("expected class create");
        };
        assert_eq!((name.as_str(), capacity), ("Morning Flow", 12));

        assert_eq!(
            parse_line("member find van  der"),
            Ok(Some(Command::FindMembers("van der".into())))
        );

        let cmd = parse_line(&format!("class list open room={r} from={D}")).unwrap();
        assert_eq!(
            cmd,
            Some(Command::ListClasses(ClassFilter {
                room_id: Some(r),
                open_only: true,
                dates: Some(DateRange { from: day(D), to: day(D) }),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(parse_line("dance"), Err(ShellError::UnknownCommand("dance".into())));
        assert_eq!(
            parse_line("room add Studio"),
            Err(ShellError::MissingArgument("capacity"))
        );
        assert!(matches!(
            parse_line("booking not-a-ulid"),
            Err(ShellError::InvalidArgument { name: "booking id", .. })
        ));
        assert!(matches!(
            parse_line(&format!("slot add {} 2024-13-01 09:00 10:00", Ulid::new())),
            Err(ShellError::InvalidArgument { name: "date", .. })
        ));
        assert_eq!(parse_line("member find"), Err(ShellError::MissingArgument("search text")));
    }

    #[test]
    fn free_window_arguments_are_bounded() {
        let t = Ulid::new();
        assert!(matches!(
            parse_line(&format!("free {t} {D} 4000000000 30")),
            Err(ShellError::InvalidArgument { name: "days", .. })
        ));
        assert!(matches!(
            parse_line(&format!("free {t} {D} 0")),
            Err(ShellError::InvalidArgument { name: "days", .. })
        ));
        assert!(matches!(
            parse_line(&format!("free {t} {D} 1 9223372036854775807")),
            Err(ShellError::InvalidArgument { name: "min-minutes", .. })
        ));
        assert!(matches!(
            parse_line(&format!("free {t} {D} 1 -5")),
            Err(ShellError::InvalidArgument { name: "min-minutes", .. })
        ));
        assert_eq!(
            parse_line(&format!("free {t} {D} 366 1440")),
            Ok(Some(Command::FreeWindows {
                trainer_id: t,
                from: Some(day(D)),
                days: Some(366),
                min_minutes: 1440,
            }))
        );
    }

    #[test]
    fn midnight_on_the_last_date_is_rejected() {
        assert!(matches!(
            parse_line(&format!("slot add {} {} 20:00 24:00", Ulid::new(), NaiveDate::MAX)),
            Err(ShellError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn oversized_free_window_requests_are_errors_not_panics() {
        let service = BookingService::open(Arc::new(MemoryRepository::new()), Arc::new(NotifyHub::new()))
            .await
            .unwrap();
        let trainer = service.register_trainer("Ana", "Lopez", "Strength").await.unwrap();
        let shell = Shell::new(Arc::new(service), u32::MAX);

        let reply = shell.run_line(&format!("free {} {D} 4000000000 30", trainer.id)).await.unwrap();
        assert_eq!(reply["error"]["kind"], "parse");
        let reply = shell
            .run_line(&format!("free {} {D} 1 9223372036854775807", trainer.id))
            .await
            .unwrap();
        assert_eq!(reply["error"]["kind"], "parse");

        // Commands built directly skip the parser's bounds.
        let huge = Command::FreeWindows {
            trainer_id: trainer.id,
            from: Some(day(D)),
            days: Some(u32::MAX),
            min_minutes: i64::MAX,
        };
        assert_eq!(shell.execute(huge).await["error"]["kind"], "limit_exceeded");
        let endless = Command::FreeWindows {
            trainer_id: trainer.id,
            from: Some(day(D)),
            days: Some(1),
            min_minutes: i64::MAX,
        };
        assert_eq!(shell.execute(endless).await["error"]["kind"], "limit_exceeded");
        let late = Command::FreeWindows {
            trainer_id: trainer.id,
            from: Some(NaiveDate::MAX),
            days: None,
            min_minutes: 30,
        };
        assert_eq!(shell.execute(late).await["error"]["kind"], "limit_exceeded");
    }

    #[tokio::test]
    async fn executes_a_booking_flow_as_json() {
        let service = BookingService::open(Arc::new(MemoryRepository::new()), Arc::new(NotifyHub::new()))
            .await
            .unwrap();
        let shell = Shell::new(Arc::new(service), 14);

        let id = |v: &Value| v["ok"]["id"].as_str().unwrap().to_owned();
        let trainer = id(&shell.run_line("trainer add Ana Lopez Strength").await.unwrap());
        let room = id(&shell.run_line("room add StudioA 20").await.unwrap());
        let member = id(&shell.run_line("member add Ben Okafor ben@example.com").await.unwrap());
        let slot = shell
            .run_line(&format!("slot add {trainer} {D} 09:00 17:00"))
            .await
            .unwrap();
        assert_eq!(slot["ok"]["status"], "Available");

        let booked = shell
            .run_line(&format!("session book {trainer} {room} {member} {D} 10:00 11:00"))
            .await
            .unwrap();
        assert_eq!(booked["ok"]["status"], "Scheduled");

        let clash = shell
            .run_line(&format!("session book {trainer} {room} {member} {D} 10:30 11:30"))
            .await
            .unwrap();
        assert_eq!(clash["error"]["kind"], "trainer_busy");

        let free = shell
            .run_line(&format!("free {trainer} {D} 1 60"))
            .await
            .unwrap();
        assert_eq!(free["ok"].as_array().unwrap().len(), 2);

        let parse_error = shell.run_line("session book nope").await.unwrap();
        assert_eq!(parse_error["error"]["kind"], "parse");
        assert!(shell.run_line("").await.is_none());
    }
}
