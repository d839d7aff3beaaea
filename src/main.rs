use anyhow::Context;
use clap::{Parser, Subcommand};
use sprint_atlas::config::AppConfig;
use sprint_atlas::{render, report, server, Dashboard, Gender, MapLayer, Selection, Tab};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard API and static front end
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print one dashboard tab to the terminal
    Report {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = Gender::Men)]
        gender: Gender,
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = Tab::Data)]
        tab: Tab,
        #[arg(long)]
        rank_limit: Option<usize>,
        #[arg(long)]
        venue_limit: Option<usize>,
        /// Country for the average-age chart; repeat for several
        #[arg(long = "country", value_name = "NAME")]
        countries: Vec<String>,
        /// Emit the view as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Render a choropleth to PNG and annotated GeoJSON
    Map {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = Gender::Men)]
        gender: Gender,
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = MapLayer::Nationality)]
        layer: MapLayer,
        /// Output directory; defaults to output.map_dir
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let app_config = AppConfig::load_from_file(&config)?;
            let dashboard = Dashboard::open(app_config).context("Failed to open dashboard")?;
            server::start_server(dashboard).await?;
        }
        Commands::Report {
            config,
            gender,
            tab,
            rank_limit,
            venue_limit,
            countries,
            json,
        } => {
            let app_config = AppConfig::load_from_file(&config)?;
            let mut selection = Selection::new(&app_config, gender, tab);
            if let Some(limit) = rank_limit {
                selection.rank_limit = limit;
            }
            if let Some(limit) = venue_limit {
                selection.venue_limit = limit;
            }
            if !countries.is_empty() {
                selection.countries = countries;
            }
            let selection = selection.clamped();

            let dashboard = Dashboard::open(app_config).context("Failed to open dashboard")?;
            let view = dashboard.render(&selection)?;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            if json {
                serde_json::to_writer_pretty(&mut out, &view)?;
                writeln!(out)?;
            } else {
                report::write_text(&view, &mut out)?;
            }
        }
        Commands::Map {
            config,
            gender,
            layer,
            out,
        } => {
            let app_config = AppConfig::load_from_file(&config)?;
            let dir = out.unwrap_or_else(|| app_config.output.map_dir.clone());
            let (width, height) = (app_config.output.width, app_config.output.height);

            let dashboard = Dashboard::open(app_config).context("Failed to open dashboard")?;
            let choropleth = dashboard.choropleth(gender, layer)?;
            let (png, geojson) = render::write_map(&choropleth, &dir, width, height)?;
            println!("Wrote {} and {}", png.display(), geojson.display());
        }
    }

    Ok(())
}
