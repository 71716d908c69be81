use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ulid::Ulid;

use clubbook::engine::{BookingError, BookingService};
use clubbook::model::*;
use clubbook::notify::NotifyHub;
use clubbook::repository::WalRepository;

const OPEN_HOUR: u32 = 6;
const HOURS_PER_DAY: usize = 16;

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
}

fn hour_on(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).expect("valid hour"))
}

/// The `i`th one-hour slot inside the daily opening hours.
fn nth_hour(i: usize) -> (NaiveDate, TimeInterval) {
    let date = base_date() + chrono::Duration::days((i / HOURS_PER_DAY) as i64);
    let hour = OPEN_HOUR + (i % HOURS_PER_DAY) as u32;
    (date, TimeInterval::new(hour_on(date, hour), hour_on(date, hour + 1)))
}

async fn open_service() -> Arc<BookingService> {
    let dir = std::env::temp_dir().join(format!("clubbook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let repo = Arc::new(WalRepository::open(&dir.join("club.wal")).expect("open wal"));
    let service = BookingService::open(repo, Arc::new(NotifyHub::new()))
        .await
        .expect("open service");
    Arc::new(service)
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

struct Lane {
    trainer: TrainerId,
    room: RoomId,
    member: MemberId,
}

/// A trainer with opening-hours availability for `days`, a room and a member.
async fn setup_lane(service: &BookingService, tag: usize, days: usize) -> Lane {
    let trainer = service
        .register_trainer("Bench", &format!("Trainer{tag}"), "Load")
        .await
        .expect("register trainer");
    let room = service
        .register_room(&format!("Room{tag}"), 60)
        .await
        .expect("register room");
    let member = service
        .register_member("Bench", &format!("Member{tag}"), &format!("m{tag}@bench.local"))
        .await
        .expect("register member");
    for d in 0..days {
        let date = base_date() + chrono::Duration::days(d as i64);
        let open = TimeInterval::new(
            hour_on(date, OPEN_HOUR),
            hour_on(date, OPEN_HOUR + HOURS_PER_DAY as u32),
        );
        service
            .set_availability(trainer.id, date, open, SlotStatus::Available)
            .await
            .expect("set availability");
    }
    Lane {
        trainer: trainer.id,
        room: room.id,
        member: member.id,
    }
}

async fn phase1_sequential() {
    let service = open_service().await;
    let n = 2000;
    let lane = setup_lane(&service, 0, n / HOURS_PER_DAY + 1).await;

    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for i in 0..n {
        let (_, interval) = nth_hour(i);
        let t = Instant::now();
        service
            .book_session(lane.trainer, lane.room, lane.member, interval)
            .await
            .expect("book session");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} sessions in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent() {
    let service = open_service().await;
    let n_tasks = 10;
    let n_per_task = 200;

    let mut lanes = Vec::new();
    for i in 0..n_tasks {
        lanes.push(setup_lane(&service, i, n_per_task / HOURS_PER_DAY + 1).await);
    }

    let start = Instant::now();
    let mut handles = Vec::new();
    for lane in lanes {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                let (_, interval) = nth_hour(j);
                service
                    .book_session(lane.trainer, lane.room, lane.member, interval)
                    .await
                    .expect("book session");
            }
        }));
    }
    for h in handles {
        h.await.expect("task panicked");
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} sessions = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load() {
    let service = open_service().await;
    let days = 60;
    let lane = setup_lane(&service, 0, days).await;
    let range = DateRange::new(base_date(), base_date() + chrono::Duration::days(days as i64 - 1))
        .expect("valid range");

    let writer = {
        let service = service.clone();
        let (trainer, room, member) = (lane.trainer, lane.room, lane.member);
        tokio::spawn(async move {
            for i in 0..days * HOURS_PER_DAY / 2 {
                let (_, interval) = nth_hour(i * 2);
                let _ = service.book_session(trainer, room, member, interval).await;
            }
        })
    };

    let mut latencies = Vec::new();
    let mut windows = 0;
    while !writer.is_finished() {
        let t = Instant::now();
        windows = service
            .free_windows(lane.trainer, range, chrono::Duration::minutes(30))
            .expect("free windows")
            .len();
        latencies.push(t.elapsed());
        tokio::task::yield_now().await;
    }
    writer.await.expect("writer panicked");

    println!("  last read saw {windows} free windows");
    print_latency("free_windows latency", &mut latencies);
}

async fn phase4_enrollment_storm() {
    let service = open_service().await;
    let lane = setup_lane(&service, 0, 1).await;
    let seats = 50;
    let n_members = 400;

    let (date, _) = nth_hour(0);
    let class = service
        .create_class(
            lane.trainer,
            lane.room,
            TimeInterval::new(hour_on(date, 18), hour_on(date, 19)),
            seats,
            "Storm",
        )
        .await
        .expect("create class");

    let mut members = Vec::with_capacity(n_members);
    for i in 0..n_members {
        let member = service
            .register_member("Storm", &format!("M{i}"), &format!("s{i}@bench.local"))
            .await
            .expect("register member");
        members.push(member.id);
    }

    let start = Instant::now();
    let mut handles = Vec::new();
    for member in members {
        let service = service.clone();
        let class_id = class.id;
        handles.push(tokio::spawn(async move {
            let t = Instant::now();
            let result = service.register_for_class(class_id, member).await;
            (result, t.elapsed())
        }));
    }

    let (mut admitted, mut turned_away) = (0, 0);
    let mut latencies = Vec::with_capacity(n_members);
    for h in handles {
        let (result, latency) = h.await.expect("task panicked");
        latencies.push(latency);
        match result {
            Ok(_) => admitted += 1,
            Err(BookingError::Capacity { .. }) => turned_away += 1,
            Err(e) => println!("  unexpected error: {e}"),
        }
    }

    let elapsed = start.elapsed();
    println!(
        "  {n_members} members raced for {seats} seats: {admitted} admitted, {turned_away} turned away in {:.2}s",
        elapsed.as_secs_f64()
    );
    assert_eq!(admitted, seats as usize, "class overbooked or underfilled");
    print_latency("enroll latency", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== clubbook stress benchmark ===\n");

    // Each phase opens its own WAL to avoid interference

    println!("[phase 1] sequential session bookings");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent bookings on independent trainers");
    phase2_concurrent().await;

    println!("\n[phase 3] free-window reads under write load");
    phase3_read_under_load().await;

    println!("\n[phase 4] class enrollment storm");
    phase4_enrollment_storm().await;

    println!("\n=== benchmark complete ===");
}
