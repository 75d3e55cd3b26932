//! Command-line readout of SPORTident cards, with optional course checking.

use chrono::{NaiveTime, Timelike};
use clap::Parser;
use log::{debug, error, info, warn};

use siread_common::punch::CardRecord;
use siread_common::time::{NO_TIME, format_time_of_day};
use siread_common::validate::{Course, auto_detect};
use siread_reader::driver::SiDriver;
use siread_reader::events::{EventSender, LogDirection, ReaderEvent, ReaderStatus};
use siread_reader::port::{self, TokioSerial};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "siread", about = "Reads SPORTident cards from a master station")]
struct Args {
    /// Serial port of the master station; autodetected when omitted.
    port: Option<String>,

    /// List available serial ports and exit.
    #[arg(short, long)]
    list: bool,

    /// Zero hour anchoring card times, e.g. 10:00.
    #[arg(long, default_value = "00:00", value_parser = parse_zero_hour)]
    zero_hour: i64,

    /// Course to check cards against, as NAME=31,32,33; may be repeated.
    #[arg(long = "course", value_name = "NAME=CODES", value_parser = parse_course)]
    courses: Vec<Course>,

    /// Treat the courses as score courses (controls in any order).
    #[arg(long)]
    score: bool,
}

fn parse_zero_hour(arg: &str) -> Result<i64, String> {
    let time = NaiveTime::parse_from_str(arg, "%H:%M").map_err(|err| err.to_string())?;
    Ok(i64::from(time.num_seconds_from_midnight()) * 1000)
}

fn parse_course(arg: &str) -> Result<Course, String> {
    let (name, codes) = arg.split_once('=').ok_or("expected NAME=31,32,33")?;
    let controls = codes
        .split(',')
        .map(|code| code.trim().parse::<u16>().map_err(|err| err.to_string()))
        .collect::<Result<Vec<u16>, String>>()?;
    if controls.is_empty() {
        return Err("a course needs at least one control".to_string());
    }
    Ok(Course::inline(name, controls))
}

#[tokio::main]
async fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .parse_default_env()
        .init();

    let mut args = Args::parse();
    if args.score {
        for course in &mut args.courses {
            course.inline = false;
        }
    }

    if args.list {
        match port::available_ports() {
            Ok(ports) => {
                for info in &ports {
                    println!("{}", port::describe_port(info));
                }
            }
            Err(err) => {
                error!("{err}");
                std::process::exit(1);
            }
        }
        return;
    }

    let port_name = match args.port.clone() {
        Some(name) => name,
        None => match port::detect_port() {
            Ok(Some(name)) => name,
            _ => {
                eprintln!("No SPORTident station found; available ports:");
                for info in port::available_ports().unwrap_or_default() {
                    eprintln!("  {}", port::describe_port(&info));
                }
                std::process::exit(1);
            }
        },
    };

    let serial = match TokioSerial::new(&port_name) {
        Ok(serial) => serial,
        Err(err) => {
            error!("Cannot open {port_name}: {err}");
            std::process::exit(1);
        }
    };
    info!("Connecting to master station on {port_name}");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            ctrl_c_cancel.cancel();
        }
    });

    // Once the driver returns it is dropped, which closes the event channel
    // and lets the printing loop below finish.
    let run_cancel = cancel.clone();
    let run = async move {
        let mut driver = SiDriver::new(serial, EventSender::new(tx), args.zero_hour);
        driver.run(run_cancel).await
    };

    let courses = args.courses;
    let events = async {
        while let Some(event) = rx.recv().await {
            match event {
                ReaderEvent::Log(direction, text) => match direction {
                    LogDirection::Error => warn!("{text}"),
                    LogDirection::Info => info!("{text}"),
                    _ => debug!("{direction} {text}"),
                },
                ReaderEvent::Status(status) => report_status(&status),
                ReaderEvent::CardRead(record) => report_card(&record, &courses),
            }
        }
    };

    let (result, ()) = tokio::join!(run, events);
    if result.is_err() {
        std::process::exit(1);
    }
}

fn report_status(status: &ReaderStatus) {
    match status {
        ReaderStatus::On => info!("Master station is ready"),
        ReaderStatus::Ready => info!("Insert a card to read it"),
        ReaderStatus::ProcessingError(msg) => warn!("Card read failed: {msg}"),
        ReaderStatus::FatalError(msg) => error!("{msg}"),
        _ => {}
    }
}

fn report_card(record: &CardRecord, courses: &[Course]) {
    info!("{record}");
    for punch in &record.punches {
        info!("  {punch}");
    }
    if courses.is_empty() {
        return;
    }
    match auto_detect(courses, &record.punches) {
        Ok(result) => {
            let course = result.course;
            if result.all_correct() {
                info!("Course {}: OK", course.name);
            } else {
                let missing: Vec<String> = result
                    .control_statuses
                    .iter()
                    .filter(|status| !status.found)
                    .map(|status| status.code.to_string())
                    .collect();
                info!("Course {}: PM, missing {}", course.name, missing.join(", "));
            }
            if !result.extra_controls.is_empty() {
                let extras: Vec<String> =
                    result.extra_controls.iter().map(u16::to_string).collect();
                info!("Extra controls: {}", extras.join(", "));
            }
            let start = course.start_time(record);
            if start != NO_TIME && record.finish != NO_TIME {
                info!("Running time: {}", format_time_of_day(record.finish - start));
            }
        }
        Err(err) => warn!("{err}"),
    }
}
