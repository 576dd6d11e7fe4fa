use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use athlete_report::api::{BillingInterval, CheckoutRequest, CheckoutSession, RegisterRequest};
use athlete_report::charts::{BarChartRenderer, ChartImages};
use athlete_report::client::ApiClient;
use athlete_report::config::{ClientConfig, ExportConfig};
use athlete_report::export::{ArtifactSink, DirectorySink, ExportedDocument, ReportExporter};
use athlete_report::model::{sort_reports, Report, SortDirection, SortKey};
use athlete_report::session::{FileTokenStore, TokenStore};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Command-line front end for the Athlete AI dashboard backend.
///
/// The backend URL comes from `ATHLETE_API_BASE_URL` (a `.env` file is
/// honoured) unless `--base-url` is given. The session is kept in
/// `ATHLETE_TOKEN_FILE` between runs.
#[derive(Parser)]
#[command(author, version, about = "Athlete AI dashboard client and report exporter")]
struct Cli {
    /// Backend base URL, e.g. `https://api.example.com/api`.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// File holding the access/refresh token pair.
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and store the issued session.
    Register {
        username: String,
        email: String,
        #[arg(long, env = "ATHLETE_PASSWORD")]
        password: String,
        #[arg(long, default_value = "free")]
        plan: String,
        #[arg(long, default_value = "month")]
        interval: String,
    },

    /// Log in and store the session.
    Login {
        username: String,
        #[arg(long, env = "ATHLETE_PASSWORD")]
        password: String,
    },

    /// Forget the stored session.
    Logout,

    /// Show the logged-in account.
    Whoami,

    /// List athlete accounts.
    Athletes,

    /// List reports.
    #[command(aliases = ["ls", "list"])]
    Reports {
        #[arg(long, value_enum, default_value_t = SortArg::UploadedAt)]
        sort: SortArg,
        #[arg(long)]
        desc: bool,
    },

    /// Export a report as PDF.
    Export {
        /// Report id to fetch from the backend.
        #[arg(required_unless_present = "input")]
        id: Option<u64>,
        /// Read the report from a JSON file instead of the backend.
        #[arg(long, conflicts_with = "id")]
        input: Option<PathBuf>,
        /// Directory the PDF is written to.
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Add a section outline to the PDF (requires the `bookmarks` feature).
        #[arg(long)]
        bookmarks: bool,
    },

    /// Delete reports by source filename.
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Upload a match data file for analysis.
    Upload { file: PathBuf },

    /// Submit a YouTube or Google Drive link for analysis.
    #[command(name = "submit-video", aliases = ["video"])]
    SubmitVideo { url: String },

    /// Start a payment session for a plan, or for a single PDF report.
    Checkout {
        /// Subscription plan id.
        #[arg(required_unless_present = "single_report")]
        plan: Option<String>,
        #[arg(long, value_enum, default_value_t = IntervalArg::Month)]
        interval: IntervalArg,
        /// Buy one PDF report instead of a subscription.
        #[arg(long, conflicts_with = "plan")]
        single_report: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum IntervalArg {
    Month,
    Year,
}

impl From<IntervalArg> for BillingInterval {
    fn from(arg: IntervalArg) -> Self {
        match arg {
            IntervalArg::Month => BillingInterval::Month,
            IntervalArg::Year => BillingInterval::Year,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Filename,
    Size,
    UploadedAt,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Filename => SortKey::Filename,
            SortArg::Size => SortKey::FileSize,
            SortArg::UploadedAt => SortKey::UploadedAt,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        if let Some(client_err) = err.downcast_ref::<athlete_report::client::ClientError>() {
            eprintln!("{}", client_err.user_message());
        }
        std::process::exit(1);
    }
}

fn client_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.base_url {
        Some(base_url) => ClientConfig::new(base_url.clone()),
        None => ClientConfig::from_env().context("backend is not configured")?,
    };
    if let Some(token_file) = &cli.token_file {
        config.token_file = token_file.clone();
    }
    Ok(config)
}

fn connect(cli: &Cli) -> anyhow::Result<ApiClient> {
    let config = client_config(cli)?;
    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(&config.token_file));
    Ok(ApiClient::from_config(config, tokens)?)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Register {
            username,
            email,
            password,
            plan,
            interval,
        } => {
            let client = connect(&cli)?;
            let request =
                RegisterRequest::new(username, email, password).with_plan(plan, interval);
            let response = client.register(&request).await?;
            println!("Registered {username}");
            if let Some(url) = response.checkout_url {
                println!("Complete your subscription at {url}");
            }
        }
        Commands::Login { username, password } => {
            connect(&cli)?.login(username, password).await?;
            println!("Logged in as {username}");
        }
        Commands::Logout => {
            connect(&cli)?.logout()?;
            println!("Logged out");
        }
        Commands::Whoami => {
            let user = connect(&cli)?.current_user().await?;
            println!("{} <{}> ({:?})", user.username, user.email, user.role);
        }
        Commands::Athletes => {
            for athlete in connect(&cli)?.athletes().await? {
                println!("{:>6}  {}  <{}>", athlete.id, athlete.username, athlete.email);
            }
        }
        Commands::Reports { sort, desc } => {
            let reports = connect(&cli)?.list_reports().await?;
            let direction = if *desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            for report in sort_reports(&reports, (*sort).into(), direction) {
                println!(
                    "{:>6}  {:<40}  {:>8.2} MB  {}",
                    report.id, report.filename, report.file_size_mb, report.uploaded_at
                );
            }
        }
        Commands::Export {
            id,
            input,
            out,
            bookmarks,
        } => {
            let report = match (input, id) {
                (Some(path), _) => load_report(path)?,
                (None, Some(id)) => connect(&cli)?.fetch_report(*id).await?,
                (None, None) => bail!("either a report id or --input is required"),
            };

            let export_config = ExportConfig::from_env()?;
            let charts = ChartImages::render_all(&report, &BarChartRenderer::new(), &export_config);
            let exporter = ReportExporter::with_default_fonts()?;
            let mut sink = DirectorySink::new(out);

            let document = if *bookmarks {
                let document = with_bookmarks(exporter.render(&report, &charts)?)?;
                sink.deliver(&document.bytes, &document.filename)
                    .with_context(|| format!("failed to write {}", document.filename))?;
                document
            } else {
                exporter.export(&report, &charts, &mut sink)?
            };
            tracing::debug!(
                pages = document.page_count,
                sections = document.sections.len(),
                "export finished"
            );
            println!(
                "{} ({} pages)",
                out.join(&document.filename).display(),
                document.page_count
            );
        }
        Commands::Delete { keys } => {
            connect(&cli)?.delete_reports(keys).await?;
            println!("Deleted {} report(s)", keys.len());
        }
        Commands::Upload { file } => {
            let bytes = std::fs::read(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .context("upload path has no file name")?;
            connect(&cli)?.upload_report_file(&filename, bytes).await?;
            println!("Uploaded {filename}");
        }
        Commands::SubmitVideo { url } => {
            let host = connect(&cli)?.submit_video_url(url).await?;
            println!("Submitted {host:?} video");
        }
        Commands::Checkout {
            plan,
            interval,
            single_report,
        } => {
            let request = match plan {
                Some(plan) if !*single_report => {
                    CheckoutRequest::subscription(plan, (*interval).into())
                }
                _ => CheckoutRequest::pdf_report(),
            };
            match connect(&cli)?.create_checkout_session(&request).await? {
                CheckoutSession::NewSubscription { checkout_url } => {
                    println!("Complete the payment at {checkout_url}")
                }
                CheckoutSession::ManageExisting { billing_portal_url } => {
                    println!("Manage your subscription at {billing_portal_url}")
                }
            }
        }
    }
    Ok(())
}

#[cfg(feature = "bookmarks")]
fn with_bookmarks(document: ExportedDocument) -> anyhow::Result<ExportedDocument> {
    Ok(document.with_bookmarks()?)
}

#[cfg(not(feature = "bookmarks"))]
fn with_bookmarks(_document: ExportedDocument) -> anyhow::Result<ExportedDocument> {
    bail!("this build was compiled without the `bookmarks` feature")
}

fn load_report(path: &Path) -> anyhow::Result<Report> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Report::from_json(&bytes).with_context(|| format!("invalid report in {}", path.display()))
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
