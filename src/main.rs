use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Duration, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use fleet::{Config, Geocoder, Provider, RouteSession, csv_io};
use telemetry::{
    ApiClient, Base, Coordinate, Credentials, DeviceDetails, FleetStatus, NearQuery, Reading,
    Session, TimeWindow, TripReport, fleet as status,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleet", version, about = "Fleet GPS telemetry client")]
struct Cli {
    /// Account alias or user name.
    #[arg(long, env = "FLEET_USER", global = true)]
    user: Option<String>,

    #[arg(long, env = "FLEET_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize the state of every device assigned to the user.
    Status,

    /// Print the readings and stops of a device over a time range.
    Route(RangeArgs),

    /// Print distance and stop analytics for a device over a time range.
    Report(RangeArgs),

    /// Write the route of a device to a CSV file.
    Export {
        #[command(flatten)]
        range: RangeArgs,

        /// Add a reverse-geocoded address column.
        #[arg(long)]
        addresses: bool,

        /// Output file or directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Read a route from a CSV export and print its report.
    Import {
        file: PathBuf,

        /// Device the rows belong to.
        #[arg(long, default_value = "csv")]
        device: String,
    },

    /// List devices reporting near a position.
    Near {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Search radius in meters.
        #[arg(long, default_value_t = 5_000.0)]
        distance: f64,

        /// Print the reverse-geocoded address of each device.
        #[arg(long)]
        addresses: bool,
    },

    /// List the devices available to the account.
    Devices {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 50)]
        limit: u32,

        /// `asc` or `desc`.
        #[arg(long, default_value = "desc")]
        sort: String,
    },

    /// Edit the vehicle details of a device. Requires an admin account.
    DeviceMeta {
        device: String,

        #[command(flatten)]
        details: DetailsArgs,
    },

    /// Manage the bases drawn on the account.
    Bases {
        #[command(subcommand)]
        action: BasesCommand,
    },
}

#[derive(Subcommand)]
enum BasesCommand {
    /// Print the bases of the account.
    List,

    /// Add a base. Requires an admin account.
    Add {
        #[arg(long)]
        name: String,

        /// A corner as `lat,lon`; pass exactly four.
        #[arg(
            long = "corner",
            required = true,
            allow_hyphen_values = true,
            value_parser = parse_corner
        )]
        corners: Vec<Coordinate>,
    },

    /// Remove the base at a position shown by `bases list`. Requires an admin
    /// account.
    Rm { position: usize },
}

#[derive(Args)]
struct DetailsArgs {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    plate: Option<String>,

    #[arg(long)]
    brand: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    color: Option<String>,

    /// Map color, `#rrggbb`.
    #[arg(long)]
    color_hex: Option<String>,
}

impl From<DetailsArgs> for DeviceDetails {
    fn from(args: DetailsArgs) -> Self {
        Self {
            name: args.name,
            plate: args.plate,
            brand: args.brand,
            model: args.model,
            color: args.color,
            color_hex: args.color_hex,
        }
    }
}

#[derive(Args)]
struct RangeArgs {
    device: String,

    /// Local start, `YYYY-MM-DDTHH:MM`.
    #[arg(long, value_parser = parse_local)]
    from: NaiveDateTime,

    /// Local end (exclusive), `YYYY-MM-DDTHH:MM`.
    #[arg(long, value_parser = parse_local)]
    to: NaiveDateTime,
}

fn parse_corner(s: &str) -> Result<Coordinate, String> {
    let (lat, lon) = s.split_once(',').ok_or_else(|| "expected lat,lon".to_string())?;
    let lat = lat.trim().parse().map_err(|err| format!("latitude: {err}"))?;
    let lon = lon.trim().parse().map_err(|err| format!("longitude: {err}"))?;
    Coordinate::new(lat, lon).ok_or_else(|| "coordinates must be finite".to_string())
}

fn parse_local(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .map_err(|err| format!("expected YYYY-MM-DDTHH:MM: {err}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let provider = Provider::new(config.http_timeout)?;

    if let Command::Import { file, device } = &cli.command {
        return import(file, device, &config);
    }

    let mut client = ApiClient::new(provider.clone(), config.api_url.clone())
        .with_path_prefix(config.path_prefix.clone())
        .with_timezone(config.timezone);
    let mut session = login(&mut client, &cli, &config).await?;

    match cli.command {
        Command::Status => fleet_status(&client, &session, &config).await,
        Command::Route(range) => {
            let (route, _) = fetch_route(&client, &session, &range, &config).await?;
            print_route(&route, &config);
            Ok(())
        }
        Command::Report(range) => {
            let (route, window) = fetch_route(&client, &session, &range, &config).await?;
            let report = TripReport::build(
                &range.device,
                window,
                &route,
                &config.stops,
                config.max_segment_km,
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Export { range, addresses, out } => {
            let (route, window) = fetch_route(&client, &session, &range, &config).await?;
            let geocoded = if addresses {
                let geocoder = Geocoder::new(provider, config.geocode_url.clone())
                    .with_language(config.geocode_language.clone());
                Some(geocoder.addresses(&route).await)
            } else {
                None
            };

            let name = csv_io::file_name(&range.device, &window, config.timezone);
            let path = match out {
                Some(dir) if dir.is_dir() => dir.join(name),
                Some(path) => path,
                None => PathBuf::from(name),
            };
            let file = File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            csv_io::export(file, &route, geocoded.as_deref(), config.timezone)?;

            tracing::info!(path = %path.display(), rows = route.len(), "route exported");
            Ok(())
        }
        Command::Near { lat, lon, distance, addresses } => {
            let query = NearQuery { distance_m: distance, ..NearQuery::new(lat, lon) };
            let page = client.near(&query).await?;
            let geocoder = Geocoder::new(provider, config.geocode_url.clone())
                .with_language(config.geocode_language.clone());

            for raw in &page.items {
                let reading = Reading::normalize_in(raw, config.timezone);
                let line = describe(&reading, &session, &config);
                match reading.position {
                    Some(position) if addresses => {
                        println!("{line}  {}", geocoder.reverse(position).await);
                    }
                    _ => println!("{line}"),
                }
            }
            Ok(())
        }
        Command::Devices { page, limit, sort } => {
            let listing = client.devices_available(page, limit, &sort).await?;
            for item in &listing.items {
                println!("{}", serde_json::to_string(item)?);
            }
            if listing.has_next() == Some(true) {
                println!("more on page {}", page + 1);
            }
            Ok(())
        }
        Command::DeviceMeta { device, details } => {
            let document = session.with_device_details(&device, &details.into(), Utc::now())?;
            client.save_metadata(&mut session, document).await?;
            println!("{}", session.display_name(&device));
            Ok(())
        }
        Command::Bases { action } => bases(&client, &mut session, action).await,
        Command::Import { .. } => Ok(()),
    }
}

async fn login(client: &mut ApiClient<Provider>, cli: &Cli, config: &Config) -> Result<Session> {
    let (Some(username), Some(password)) = (&cli.user, &cli.password) else {
        bail!("credentials required: pass --user and --password or set FLEET_USER/FLEET_PASSWORD");
    };
    let credentials = Credentials {
        username: username.clone(),
        password: password.clone(),
        style: config.login_style,
    };

    let session = client.login(&credentials).await?;
    tracing::info!(devices = session.devices().len(), "logged in");
    Ok(session)
}

async fn fleet_status(
    client: &ApiClient<Provider>, session: &Session, config: &Config,
) -> Result<()> {
    let ids = session.devices();
    let readings = status::snapshot(client, &ids).await;
    let summary = FleetStatus::summarize(&ids, &readings, Utc::now(), config.stale_after);

    println!("devices:     {}", summary.total);
    for (label, bucket) in [
        ("in transit", &summary.in_transit),
        ("stopped", &summary.stopped),
        ("no report", &summary.stale),
        ("other", &summary.other),
        ("unreachable", &summary.unreported),
    ] {
        let names: Vec<String> = bucket.iter().map(|id| session.display_name(id)).collect();
        println!("{label:<12} {:>3}  {}", bucket.len(), names.join(", "));
    }
    Ok(())
}

async fn bases(
    client: &ApiClient<Provider>, session: &mut Session, action: BasesCommand,
) -> Result<()> {
    match action {
        BasesCommand::List => {}
        BasesCommand::Add { name, corners } => {
            let corners: [Coordinate; 4] = corners
                .try_into()
                .map_err(|corners: Vec<Coordinate>| {
                    anyhow!("a base needs 4 corners, got {}", corners.len())
                })?;
            let base = Base::new(&name, corners, Utc::now())?;
            let document = session.with_base(&base)?;
            client.save_metadata(session, document).await?;
        }
        BasesCommand::Rm { position } => {
            let index = position.checked_sub(1).ok_or_else(|| anyhow!("positions start at 1"))?;
            let document = session.without_base(index)?;
            client.save_metadata(session, document).await?;
        }
    }

    for (position, base) in session.bases().iter().enumerate() {
        let corners: Vec<String> =
            base.points.iter().map(|[lat, lon]| format!("{lat:.6},{lon:.6}")).collect();
        println!("{:>2}  {:<20} {}", position + 1, base.name, corners.join("  "));
    }
    Ok(())
}

async fn fetch_route(
    client: &ApiClient<Provider>, session: &Session, range: &RangeArgs, config: &Config,
) -> Result<(Vec<Reading>, TimeWindow)> {
    let devices = session.devices();
    if !devices.is_empty() && !session.is_authorized(&range.device) {
        bail!("device {} is not assigned to this account", range.device);
    }

    let window = TimeWindow::from_local(range.from, range.to, config.timezone)?;
    let route = RouteSession::new()
        .load(client, &range.device, window, &config.range_options())
        .await?
        .ok_or_else(|| anyhow!("route query was superseded"))?;

    Ok((route.readings.clone(), window))
}

fn import(file: &Path, device: &str, config: &Config) -> Result<()> {
    let reader = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let readings = csv_io::import(reader, device, config.timezone)?;

    let (Some(first), Some(last)) = (readings.first(), readings.last()) else {
        bail!("{} has no readings", file.display());
    };
    let window = TimeWindow::new(first.timestamp, last.timestamp + Duration::seconds(1))?;
    let report = TripReport::build(device, window, &readings, &config.stops, config.max_segment_km);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_route(readings: &[Reading], config: &Config) {
    for reading in readings {
        let local = reading.timestamp.with_timezone(&config.timezone);
        let position = reading
            .position
            .map_or_else(|| "-".to_string(), |p| format!("{:.6}, {:.6}", p.lat, p.lon));
        println!(
            "{}  {position:<24} {:>5.1} km/h  {}",
            local.format("%Y-%m-%d %H:%M:%S"),
            reading.speed,
            reading.event_code.label()
        );
    }

    let stops = telemetry::stops::detect_in_route(readings, &config.stops);
    for stop in &stops {
        println!(
            "stop  {:.6}, {:.6}  {} - {}  ({} min)",
            stop.center.lat,
            stop.center.lon,
            stop.start.with_timezone(&config.timezone).format("%H:%M"),
            stop.end.with_timezone(&config.timezone).format("%H:%M"),
            stop.duration().num_minutes()
        );
    }
}

fn describe(reading: &Reading, session: &Session, config: &Config) -> String {
    let local = reading.timestamp.with_timezone(&config.timezone);
    let position = reading
        .position
        .map_or_else(|| "-".to_string(), |p| format!("{:.6}, {:.6}", p.lat, p.lon));
    format!(
        "{:<20} {position:<24} {}  {}",
        session.display_name(&reading.device_id),
        local.format("%Y-%m-%d %H:%M"),
        reading.event_code.label()
    )
}
