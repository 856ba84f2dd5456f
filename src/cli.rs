use std::{
    env,
    io::{self, Write},
    path::PathBuf,
    process::{Command, Stdio},
};

use anyhow::Context;
use chrono::{Datelike, Local, NaiveDate, Utc};

use fellowship::{
    app::{AppState, Notice},
    calendar::{Event as CalendarEvent, RsvpFilter, RsvpStatus, ViewMode},
    storage::{
        config::{Config, UiConfig},
        preferences::PreferencesStore,
    },
    sync::SyncEngine,
    ui::CalendarCell,
};

const USAGE: &str = "Usage: fellowship [--agenda [YYYY/MM/DD] | --upcoming | --month [YYYY/MM]] \
[--status going|maybe|declined] [--tag TAG_ID]...\n       \
fellowship --rsvp EVENT_ID going|maybe|declined\n       \
fellowship --export EVENT_ID FILE\n       \
fellowship --upload FILE\n       \
fellowship --notify TAG_ID on|off";

#[derive(Debug, Clone, PartialEq)]
pub enum CliMode {
    Agenda { date: NaiveDate, rsvp: RsvpFilter, tags: Vec<String> },
    Upcoming { rsvp: RsvpFilter, tags: Vec<String> },
    Month(NaiveDate),
    Rsvp { event_id: String, status: RsvpStatus },
    Export { event_id: String, path: PathBuf },
    Upload(PathBuf),
    Notify { tag_id: String, enabled: bool },
    Help,
}

pub fn usage() -> &'static str {
    USAGE
}

pub fn parse_cli_mode() -> Result<CliMode, String> {
    parse_args(env::args().skip(1), Local::now().date_naive())
}

pub fn parse_args<I>(args: I, today: NaiveDate) -> Result<CliMode, String>
where
    I: IntoIterator<Item = String>,
{
    let mut agenda_date = None;
    let mut month = None;
    let mut rsvp = RsvpFilter::All;
    let mut tags = Vec::new();
    let mut args = args.into_iter().peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--agenda" => {
                let target_date = match args.next_if(|next| !next.starts_with("--")) {
                    Some(date_str) => NaiveDate::parse_from_str(&date_str, "%Y/%m/%d")
                        .map_err(|_| format!("Invalid date '{}'. Use YYYY/MM/DD.", date_str))?,
                    None => today,
                };
                agenda_date = Some(target_date);
            }
            "--upcoming" => {}
            "--month" => {
                let anchor = match args.next_if(|next| !next.starts_with("--")) {
                    Some(month_str) => NaiveDate::parse_from_str(&format!("{}/01", month_str), "%Y/%m/%d")
                        .map_err(|_| format!("Invalid month '{}'. Use YYYY/MM.", month_str))?,
                    None => today,
                };
                month = Some(anchor);
            }
            "--status" => {
                let value = args.next().ok_or("--status needs a value")?;
                rsvp = RsvpFilter::parse(&value).ok_or_else(|| format!("Unknown status '{}'", value))?;
            }
            "--tag" => {
                tags.push(args.next().ok_or("--tag needs a tag id")?);
            }
            "--rsvp" => {
                let event_id = args.next().ok_or("--rsvp needs an event id")?;
                let value = args.next().ok_or("--rsvp needs a status")?;
                let status = RsvpStatus::parse(&value).ok_or_else(|| format!("Unknown status '{}'", value))?;
                return Ok(CliMode::Rsvp { event_id, status });
            }
            "--export" => {
                let event_id = args.next().ok_or("--export needs an event id")?;
                let path = args.next().ok_or("--export needs an output file")?;
                return Ok(CliMode::Export { event_id, path: PathBuf::from(path) });
            }
            "--upload" => {
                let path = args.next().ok_or("--upload needs a file")?;
                return Ok(CliMode::Upload(PathBuf::from(path)));
            }
            "--notify" => {
                let tag_id = args.next().ok_or("--notify needs a tag id")?;
                let enabled = match args.next().as_deref() {
                    Some("on") => true,
                    Some("off") => false,
                    other => return Err(format!("--notify expects on|off, got {:?}", other)),
                };
                return Ok(CliMode::Notify { tag_id, enabled });
            }
            "--help" | "-h" => return Ok(CliMode::Help),
            _ => return Err(format!("Unknown argument: {}", arg)),
        }
    }

    if let Some(anchor) = month {
        Ok(CliMode::Month(anchor))
    } else if let Some(date) = agenda_date {
        Ok(CliMode::Agenda { date, rsvp, tags })
    } else {
        Ok(CliMode::Upcoming { rsvp, tags })
    }
}

pub async fn run(mode: CliMode) -> anyhow::Result<()> {
    if mode == CliMode::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    if let CliMode::Notify { tag_id, enabled } = &mode {
        return update_notification_preference(tag_id, *enabled);
    }

    let config = Config::load_or_create().context("loading config")?;
    let engine = SyncEngine::from_config(&config);

    match mode {
        CliMode::Agenda { date, rsvp, tags } => {
            let mut app = load_state(&engine, date).await?;
            app.select_date(date);
            apply_list_filters(&mut app, rsvp, &tags);
            let title = format!("Agenda – {}", date.format("%A, %B %d, %Y"));
            display_with_pager(&format_event_list(&title, &app, &config.ui))?;
        }
        CliMode::Upcoming { rsvp, tags } => {
            let mut app = load_state(&engine, Local::now().date_naive()).await?;
            app.show_upcoming();
            apply_list_filters(&mut app, rsvp, &tags);
            display_with_pager(&format_event_list("Upcoming events", &app, &config.ui))?;
        }
        CliMode::Month(anchor) => {
            let mut app = load_state(&engine, anchor).await?;
            app.select_date(anchor);
            let cells = app.month_cells();
            print!("{}", format_month(anchor, &cells, config.ui.max_dots_per_cell));
        }
        CliMode::Rsvp { event_id, status } => {
            let mut app = load_state(&engine, Local::now().date_naive()).await?;
            if app.event(&event_id).is_some() {
                app.rsvp(&engine, &event_id, status).await?;
            } else {
                engine.set_rsvp(&event_id, status).await?;
                app.notify(Notice::info(format!("RSVP set to {}", status)));
            }
            print_notices(app.take_notices());
        }
        CliMode::Export { event_id, path } => {
            let bytes = engine.export_event_ics(&event_id).await?;
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Saved {} bytes to {}", bytes.len(), path.display());
        }
        CliMode::Upload(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let stored = engine.upload_image(bytes, &file_name).await?;
            println!("{}", engine.image_url(&stored));
        }
        CliMode::Notify { .. } | CliMode::Help => {}
    }

    Ok(())
}

async fn load_state<A: fellowship::sync::BackendApi>(
    engine: &SyncEngine<A>,
    around: NaiveDate,
) -> anyhow::Result<AppState> {
    let mut app = AppState::new();
    app.selected_date = around;
    if let Err(e) = app.refresh(engine).await {
        print_notices(app.take_notices());
        return Err(e).context("fetching events");
    }
    Ok(app)
}

fn apply_list_filters(app: &mut AppState, rsvp: RsvpFilter, tags: &[String]) {
    app.set_rsvp_filter(rsvp);
    for tag in tags {
        app.toggle_tag_filter(tag);
    }
}

fn update_notification_preference(tag_id: &str, enabled: bool) -> anyhow::Result<()> {
    let store = PreferencesStore::new(PreferencesStore::default_path());
    let mut prefs = store.load()?;
    prefs.set(tag_id, enabled);
    store.save(&prefs)?;
    tracing::info!("Notifications for {} set to {}", tag_id, enabled);
    println!("Notifications for {} are now {}", tag_id, if enabled { "on" } else { "off" });
    Ok(())
}

fn print_notices(notices: Vec<Notice>) {
    for notice in notices {
        eprintln!("{}", notice.message);
    }
}

fn format_event_list(title: &str, app: &AppState, ui: &UiConfig) -> String {
    let mut lines = Vec::new();
    lines.push(title.to_string());
    if app.filter.view_mode == ViewMode::Upcoming || app.filter.rsvp != RsvpFilter::All || !app.filter.tag_ids.is_empty() {
        lines.push(describe_filters(app));
    }
    lines.push(String::new());

    let events = app.visible_events(Utc::now());
    if events.is_empty() {
        lines.push("No events scheduled.".to_string());
    } else {
        for event in events {
            lines.push(format!("- {}", build_event_line(event, app, ui)));
        }
    }

    lines.join("\n")
}

fn describe_filters(app: &AppState) -> String {
    let mut parts = vec![format!("status: {:?}", app.filter.rsvp).to_lowercase()];
    if !app.filter.tag_ids.is_empty() {
        let names: Vec<&str> = app
            .filter
            .tag_ids
            .iter()
            .map(|id| app.tag_name(id).unwrap_or(id.as_str()))
            .collect();
        parts.push(format!("tags: {}", names.join(", ")));
    }
    format!("({})", parts.join("; "))
}

fn build_event_line(event: &CalendarEvent, app: &AppState, ui: &UiConfig) -> String {
    let start_local = event.start_at.with_timezone(&Local);
    let end_local = event.end_at.with_timezone(&Local);
    let pattern = ui.time_pattern();
    let time_label = if event.is_all_day {
        format!("{} All Day", start_local.format("%m/%d"))
    } else {
        format!(
            "{} {}-{}",
            start_local.format("%m/%d"),
            start_local.format(pattern),
            end_local.format(pattern)
        )
    };

    let mut line = format!("{:<20} {}", time_label, event.title);
    if let Some(location) = &event.location
        && !location.is_empty()
    {
        line.push_str(&format!(" @ {}", location));
    }
    if let Some(rsvp) = event.my_rsvp {
        line.push_str(&format!(" [{}]", rsvp));
    }
    if !event.audience_tags.is_empty() {
        let names: Vec<&str> = event
            .audience_tags
            .iter()
            .map(|id| app.tag_name(id).unwrap_or(id.as_str()))
            .collect();
        line.push_str(&format!(" #{}", names.join(" #")));
    }
    line
}

fn format_month(anchor: NaiveDate, cells: &[CalendarCell<'_>], max_dots: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", anchor.format("%B %Y")));
    out.push_str(" Sun    Mon    Tue    Wed    Thu    Fri    Sat\n");

    for week in cells.chunks(7) {
        let mut row = String::new();
        for cell in week {
            let marker = if cell.is_selected {
                '>'
            } else if cell.is_today {
                '*'
            } else {
                ' '
            };
            let day = if cell.is_current_month {
                format!("{:>2}", cell.date.day())
            } else {
                " .".to_string()
            };
            let (shown, overflow) = cell.dots(max_dots);
            let mut dots = "•".repeat(shown);
            if overflow > 0 {
                dots.push('+');
            }
            row.push_str(&format!("{}{}{:<4}", marker, day, dots));
        }
        out.push_str(row.trim_end());
        out.push('\n');
    }

    out
}

fn display_with_pager(text: &str) -> Result<(), io::Error> {
    let pager_value = env::var("PAGER").unwrap_or_else(|_| "less".to_string());
    let mut parts = pager_value.split_whitespace();
    let cmd = match parts.next() {
        Some(c) => c,
        None => {
            println!("{text}");
            return Ok(());
        }
    };
    let args: Vec<&str> = parts.collect();

    match Command::new(cmd)
        .args(&args)
        .stdin(Stdio::piped())
        .spawn()
    {
        Ok(mut child) => {
            if let Some(stdin) = child.stdin.as_mut() {
                stdin.write_all(text.as_bytes())?;
            }
            let _ = child.wait();
        }
        Err(_) => {
            println!("{text}");
        }
    }

    Ok(())
}
