use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mindmap_pipeline::mindmap::MindmapContext;
use mindmap_pipeline::pipeline::normalize_url;
use mindmap_pipeline::{render_outline_locally, Config, Services};

fn course_arg() -> Arg {
    Arg::new("course")
        .value_name("COURSE_ID")
        .help("Course identifier")
        .required(true)
}

fn cli() -> Command {
    Command::new("mindmap-pipeline")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Course video transcripts, AI summaries and markmap mind maps")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("serve").about("Run the HTTP API").arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("Listen port (overrides configuration)")
                    .value_parser(clap::value_parser!(u16)),
            ),
        )
        .subcommand(
            Command::new("transcribe")
                .about("Fetch transcripts for every video of a course")
                .arg(course_arg())
                .arg(
                    Arg::new("token")
                        .short('t')
                        .long("token")
                        .value_name("TOKEN")
                        .help("Caption provider access token"),
                ),
        )
        .subcommand(
            Command::new("summarize")
                .about("Generate video, section and course summaries")
                .arg(course_arg()),
        )
        .subcommand(
            Command::new("mindmap")
                .about("Print the markmap mind map of one video")
                .arg(course_arg())
                .arg(
                    Arg::new("video")
                        .value_name("VIDEO_URL")
                        .help("Video URL or numeric id")
                        .required(true),
                )
                .arg(
                    Arg::new("offline")
                        .long("offline")
                        .help("Render the outline locally instead of with the model")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Show transcription progress of a course")
                .arg(course_arg()),
        )
        .subcommand(
            Command::new("reset")
                .about("Make unfinished transcripts eligible again")
                .arg(course_arg())
                .arg(
                    Arg::new("failed-only")
                        .long("failed-only")
                        .help("Only reset failed records")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write the effective configuration to a file")
                .arg(
                    Arg::new("output")
                        .value_name("FILE")
                        .default_value("mindmap-pipeline.toml"),
                ),
        )
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { config.server.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mindmap_pipeline={},warn", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument: {}", name))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };
    init_logging(&config, matches.get_flag("verbose"));

    if let Some(("init-config", sub)) = matches.subcommand() {
        return config.save(required(sub, "output")?);
    }

    info!("🚀 Mind-map pipeline starting...");
    let services = Services::build(config).await?;

    match matches.subcommand() {
        Some(("serve", sub)) => serve(&services, sub.get_one::<u16>("port").copied()).await?,
        Some(("transcribe", sub)) => {
            let course_id = required(sub, "course")?;
            let token = services.access_token(sub.get_one::<String>("token").map(String::as_str))?;
            let report = services
                .transcripts
                .process_course_videos(course_id, &token)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(("summarize", sub)) => {
            let summaries = services
                .summaries
                .as_ref()
                .ok_or_else(|| anyhow!("set OPENAI_API_KEY to generate summaries"))?;
            let report = summaries
                .process_course_for_summaries(required(sub, "course")?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(("mindmap", sub)) => {
            let course_id = required(sub, "course")?;
            let video = required(sub, "video")?;
            let pipeline = services.pipeline()?;

            let markdown = if sub.get_flag("offline") {
                let video_url = normalize_url(video);
                let text = services
                    .transcripts
                    .get_transcription(course_id, &video_url)
                    .await?
                    .ok_or_else(|| anyhow!("no transcript for {}", video_url))?;
                let outline = pipeline
                    .structurer()
                    .structure_transcription(&text, Some(MindmapContext::new(course_id, &video_url)))
                    .await?;
                render_outline_locally(&outline)
            } else {
                pipeline.generate_mindmap(course_id, video).await?
            };
            println!("{}", markdown);
        }
        Some(("status", sub)) => {
            let status = services
                .transcripts
                .course_status(required(sub, "course")?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Some(("reset", sub)) => {
            let course_id = required(sub, "course")?;
            let count = services
                .transcripts
                .reset_course(course_id, sub.get_flag("failed-only"))
                .await?;
            info!("🔄 {} records reset for course {}", count, course_id);
        }
        _ => warn!("No command given"),
    }

    Ok(())
}

#[cfg(feature = "api")]
async fn serve(services: &Services, port: Option<u16>) -> Result<()> {
    let state = services.app_state()?;
    let host = services.config.server.host.clone();
    let port = port.unwrap_or(services.config.server.port);

    mindmap_pipeline::api::ApiServer::new(state, host, port)
        .start()
        .await
}

#[cfg(not(feature = "api"))]
async fn serve(_services: &Services, _port: Option<u16>) -> Result<()> {
    Err(anyhow!("built without the `api` feature"))
}
