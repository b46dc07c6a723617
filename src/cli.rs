use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

use crate::{
    data_dir,
    db::models::{OrderType, VisitDetails},
    places::GeoPoint,
    stats::commands as stats_commands,
    timer::{commands as timer_commands, SessionEvent, SessionStatus, TimerEvent},
    utils::format::{extract_postcode, format_time_ago, format_wait},
    AppState,
};

const USAGE: &str = "usage:
  pubwait history                 every logged visit, newest first
  pubwait recent                  the latest three visits
  pubwait stats <name>            average waits for establishments matching <name>
  pubwait venue <name>            drink breakdown for exactly <name>
  pubwait nearby [<lat> <lon>]    logged establishments near you
  pubwait time <name> <order-type> <drink...> [--place <id>] [--address <text>] [--at <lat> <lon>]
                                  time a wait (order types: beer, bottles, cocktail, wine, spirit, other)";

const TIMER_HELP: &str =
    "commands: here | stop | rate <1-5> | submit | cancel | status (any input counts as activity)";

pub async fn dispatch(args: Vec<String>) -> Result<()> {
    let Some(command) = args.first().map(String::as_str) else {
        println!("{USAGE}");
        return Ok(());
    };
    if matches!(command, "help" | "-h" | "--help") {
        println!("{USAGE}");
        return Ok(());
    }

    let state = AppState::open(&data_dir()?)?;
    match command {
        "history" => print_history(&state).await,
        "recent" => print_recent(&state).await,
        "stats" => print_stats(&state, &args[1..].join(" ")).await,
        "venue" => print_venue(&state, &args[1..].join(" ")).await,
        "nearby" => print_nearby(&state, &args[1..]).await,
        "time" => {
            let details = parse_details(&args[1..])?;
            time_visit(&state, details).await
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

fn parse_details(args: &[String]) -> Result<VisitDetails> {
    let mut positional = Vec::new();
    let mut place_id = None;
    let mut address = None;
    let mut position = None;

    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--place" => place_id = Some(flag_value(&mut args, "--place")?),
            "--address" => address = Some(flag_value(&mut args, "--address")?),
            "--at" => {
                let latitude: f64 = flag_value(&mut args, "--at")?.parse()?;
                let longitude: f64 = flag_value(&mut args, "--at")?.parse()?;
                position = Some(GeoPoint::new(latitude, longitude));
            }
            _ => positional.push(arg.as_str()),
        }
    }

    let [name, order_type, drink @ ..] = positional.as_slice() else {
        bail!("time needs <name> <order-type> <drink...>");
    };
    let order_type: OrderType = order_type.parse()?;
    let mut details = VisitDetails::new(*name, order_type, drink.join(" "));
    details.place_id = place_id;
    details.formatted_address = address;
    if let Some(position) = position {
        details.latitude = Some(position.latitude);
        details.longitude = Some(position.longitude);
    }
    details.validate()?;
    Ok(details)
}

fn flag_value<'a>(args: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String> {
    args.next()
        .cloned()
        .ok_or_else(|| anyhow!("{flag} needs a value"))
}

async fn print_history(state: &AppState) -> Result<()> {
    let visits = stats_commands::list_history(state)
        .await
        .map_err(|e| anyhow!(e))?;
    if visits.is_empty() {
        println!("No times recorded yet");
        return Ok(());
    }
    for visit in visits {
        let postcode = visit
            .details
            .formatted_address
            .as_deref()
            .and_then(extract_postcode)
            .map(|code| format!(" ({code})"))
            .unwrap_or_default();
        println!(
            "{:<32} {:<9} {:>6}  {}★  {}",
            format!("{}{}", visit.establishment_name(), postcode),
            visit.order_type(),
            format_wait(visit.wait_time_secs as f64),
            visit.rating.value(),
            visit.created_at.format("%Y-%m-%d"),
        );
    }
    Ok(())
}

async fn print_recent(state: &AppState) -> Result<()> {
    let now = Utc::now();
    for visit in stats_commands::recent_visits(state)
        .await
        .map_err(|e| anyhow!(e))?
    {
        println!(
            "{}: {} wait time, {}★, {}",
            visit.establishment_name(),
            format_wait(visit.wait_time_secs as f64),
            visit.rating.value(),
            format_time_ago(visit.created_at, now),
        );
    }
    Ok(())
}

async fn print_stats(state: &AppState, term: &str) -> Result<()> {
    let results = stats_commands::search_establishments(state, term)
        .await
        .map_err(|e| anyhow!(e))?;
    if results.is_empty() {
        println!("No results found");
        return Ok(());
    }
    for establishment in results {
        println!("{}", establishment.establishment_name);
        if let Some(address) = &establishment.formatted_address {
            println!("  {address}");
        }
        println!(
            "  Average wait: {} ({} visits, rated {:.1})",
            format_wait(establishment.stats.average_wait_secs),
            establishment.stats.visit_count,
            establishment.stats.average_rating,
        );
        for drink in &establishment.stats.drinks {
            println!(
                "    {} / {}: {} ({} orders)",
                drink.order_type,
                drink.drink_details,
                format_wait(drink.average_wait_secs),
                drink.count,
            );
        }
    }
    Ok(())
}

async fn print_venue(state: &AppState, name: &str) -> Result<()> {
    let stats = stats_commands::establishment_stats(state, name.trim())
        .await
        .map_err(|e| anyhow!(e))?;
    if stats.visit_count == 0 {
        println!("No times recorded for {name}");
        return Ok(());
    }
    println!(
        "{name}: {} average wait over {} visits, rated {:.1}",
        format_wait(stats.average_wait_secs),
        stats.visit_count,
        stats.average_rating,
    );
    for drink in &stats.drinks {
        println!(
            "  {} / {}: {} ({} orders)",
            drink.order_type,
            drink.drink_details,
            format_wait(drink.average_wait_secs),
            drink.count,
        );
    }
    Ok(())
}

async fn print_nearby(state: &AppState, args: &[String]) -> Result<()> {
    let origin = match args {
        [] => None,
        [lat, lon] => Some(GeoPoint::new(lat.parse()?, lon.parse()?)),
        _ => bail!("nearby takes either no arguments or <lat> <lon>"),
    };
    let places = stats_commands::nearby_places(state, origin)
        .await
        .map_err(|e| anyhow!(e))?;
    if places.is_empty() {
        println!("No logged places nearby");
    }
    for place in places {
        println!(
            "{:<32} {:.1}km away, {:.1}★, {} average wait",
            place.establishment_name,
            place.distance_meters / 1000.0,
            place.average_rating,
            format_wait(place.average_wait_secs),
        );
    }
    Ok(())
}

async fn time_visit(state: &AppState, details: VisitDetails) -> Result<()> {
    let mut events = state.timer.subscribe();
    timer_commands::start_session(state, details)
        .await
        .map_err(|e| anyhow!(e))?;
    println!("Timer started. {TIMER_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(TimerEvent::Tick { elapsed_secs }) if elapsed_secs % 60 == 0 => {
                    println!("{}", format_wait(elapsed_secs as f64));
                }
                Ok(TimerEvent::Notice(notice)) => {
                    println!("{}", notice.message());
                    if matches!(notice, SessionEvent::Abandoned { .. }) {
                        return Ok(());
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    let _ = timer_commands::cancel_session(state).await;
                    println!("Input closed, timer cancelled");
                    return Ok(());
                };
                if handle_timer_input(state, line.trim()).await {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns `true` once the session is over.
async fn handle_timer_input(state: &AppState, input: &str) -> bool {
    let snapshot = state.timer.snapshot().await;
    if snapshot.status == SessionStatus::Running {
        let _ = timer_commands::still_here(state).await;
    }

    let mut parts = input.split_whitespace();
    let result = match parts.next() {
        None | Some("here") => Ok(None),
        Some("stop") => timer_commands::stop_session(state).await.map(|snapshot| {
            Some(format!(
                "Stopped at {}. Rate the service with `rate <1-5>`, then `submit`.",
                format_wait(snapshot.elapsed_secs as f64)
            ))
        }),
        Some("rate") => match parts.next().map(str::parse::<i64>) {
            Some(Ok(rating)) => timer_commands::rate_service(state, rating)
                .await
                .map(|_| Some(format!("Rated {rating}★"))),
            _ => Err("usage: rate <1-5>".to_string()),
        },
        Some("submit") => match timer_commands::submit_visit(state).await {
            Ok(record) => {
                println!(
                    "Time logged: {} at {}",
                    format_wait(record.wait_time_secs as f64),
                    record.establishment_name()
                );
                return true;
            }
            Err(err) => Err(err),
        },
        Some("cancel") => match timer_commands::cancel_session(state).await {
            Ok(_) => {
                println!("Cancelled, nothing was saved");
                return true;
            }
            Err(err) => Err(err),
        },
        Some("status") => timer_commands::get_session_state(state)
            .await
            .map(|snapshot| {
                Some(format!(
                    "{:?} {}",
                    snapshot.status,
                    format_wait(snapshot.elapsed_secs as f64)
                ))
            }),
        Some(_) => Ok(Some(TIMER_HELP.to_string())),
    };

    match result {
        Ok(Some(message)) => println!("{message}"),
        Ok(None) => {}
        Err(err) => println!("{err}"),
    }
    false
}
