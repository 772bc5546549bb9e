use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, BufReader};

use gibsi_client::{
    api::{
        admin::{CollectionQuery, CollectionRange, PageDirection, ProcessAction, ResetTarget},
        market::{DataQuery, DataSet},
        ApiError, LoginRequest, RegisterRequest,
    },
    config::Settings,
    pages::Page,
    poller::Poller,
    session::{Activity, LoginPrompt, LogoutReason, Session, SessionState},
};

#[derive(Debug, Parser)]
#[command(name = "gibsi", version, about = "Terminal client for the gibsi dashboard")]
pub struct Cli {
    /// Override GIBSI_API_URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Override GIBSI_STORAGE (sqlite|bridge)
    #[arg(long, global = true)]
    pub storage: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(url) = &self.api_url {
            settings.api_url = url.clone();
        }
        if let Some(storage) = &self.storage {
            settings.storage = storage.to_lowercase();
        }
        settings.validate()
    }
}

/// One line typed at the `shell` prompt.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WatchView {
    Live,
    Intra,
    Health,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in with a password or a 4-digit passcode
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "GIBSI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        passcode: Option<String>,
    },
    /// Create an account and log in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "GIBSI_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        passcode: String,
    },
    Logout,
    /// Session state, stored tokens and the menu available
    Status,
    Profile,
    TopGainers,
    LiveGainers,
    IntraGainers,
    Market,
    Stocks,
    Chart {
        stock_id: String,
        /// e.g. 2024-06-03T10:15
        datetime: String,
    },
    Query {
        /// intraday|periodic_summary
        #[arg(long, default_value = "intraday")]
        db: DataSet,
        #[arg(long)]
        ticker: String,
        #[arg(long)]
        stock_id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        date: Option<String>,
    },
    Purchases {
        date: String,
    },
    Health,
    /// Start, stop, pause or restart a backend process
    Process {
        name: String,
        action: ProcessAction,
    },
    Collections,
    Collection {
        name: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        prev: bool,
        #[arg(long)]
        cursor: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        ticker: Option<String>,
    },
    /// Download a date range as CSV
    Export {
        collection: String,
        start: String,
        end: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    DeleteRange {
        collection: String,
        start: String,
        end: String,
    },
    Users,
    ResetPassword {
        new_password: String,
        /// Another user's gid (admin)
        #[arg(long)]
        gid: Option<String>,
    },
    /// Push an alert to everyone, or to one user with --gid
    Alert {
        title: String,
        message: String,
        #[arg(long)]
        gid: Option<String>,
    },
    /// Raw authenticated GET
    Get {
        path: String,
    },
    /// Poll a live view until interrupted
    Watch {
        view: WatchView,
    },
    /// Interactive prompt; locks after the idle timeout
    Shell,
}

impl Command {
    /// View whose access rules gate this command.
    fn page(&self) -> Option<Page> {
        let page = match self {
            Command::Profile | Command::ResetPassword { gid: None, .. } => Page::Profile,
            Command::TopGainers | Command::Market => Page::TopGainers,
            Command::LiveGainers => Page::LiveGainers,
            Command::IntraGainers => Page::IntraGainers,
            Command::Stocks | Command::Chart { .. } => Page::Chart,
            Command::Query { .. } => Page::DataQuery,
            Command::Purchases { .. } => Page::StockAnalyze,
            Command::Health | Command::Process { .. } => Page::HealthCheck,
            Command::Collections | Command::Collection { .. } | Command::DeleteRange { .. } => {
                Page::DbOverview
            }
            Command::Export { .. } => Page::MongoExport,
            Command::Users | Command::ResetPassword { gid: Some(_), .. } => Page::UserProfile,
            Command::Alert { .. } => Page::SendNotifier,
            Command::Watch { view } => match view {
                WatchView::Live => Page::LiveGainers,
                WatchView::Intra => Page::IntraGainers,
                WatchView::Health => Page::HealthCheck,
            },
            _ => return None,
        };
        Some(page)
    }
}

fn print_json(v: &JsonValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

pub async fn run(command: Command, session: &Session, settings: &Settings) -> Result<()> {
    match command {
        Command::Shell => shell(session, settings).await,
        other => execute(other, session, settings).await,
    }
}

async fn execute(command: Command, session: &Session, settings: &Settings) -> Result<()> {
    if let Some(page) = command.page() {
        session.authorize(page)?;
    }
    let client = session.client();

    match command {
        Command::Login {
            email,
            password,
            passcode,
        } => {
            if session.state() == SessionState::Unlocked {
                println!("already logged in");
                return Ok(());
            }
            if session.open_login().await? == LoginPrompt::Resumed {
                println!("session resumed");
                return Ok(());
            }
            let req = match (password, passcode) {
                // A passcode wins over a password picked up from the environment.
                (_, Some(code)) => LoginRequest::with_passcode(email, code),
                (Some(pw), None) => LoginRequest::with_password(email, pw),
                (None, None) => return Err(anyhow!("--password or --passcode is required")),
            };
            if let Err(e) = session.login(&req).await {
                session.cancel_login();
                return Err(e.into());
            }
            println!("logged in");
        }
        Command::Register {
            username,
            email,
            password,
            passcode,
        } => {
            session
                .register(&RegisterRequest {
                    username,
                    email,
                    password,
                    passcode,
                })
                .await?;
            println!("registered and logged in");
        }
        Command::Logout => {
            session.logout(LogoutReason::User).await;
            println!("logged out");
        }
        Command::Status => {
            let tokens = client.tokens();
            println!("state: {}", session.state().as_str());
            println!("backend: {}", client.base_url());
            println!("storage: {}", tokens.backend_kind());
            println!("credentials: {}", tokens.credentials().is_some());
            if let Some(p) = session.profile() {
                println!("user: {} <{}> ({})", p.username, p.email, p.usertype.as_str());
            }
            let menu = Page::menu(session.state() == SessionState::Unlocked, session.is_admin());
            for page in menu {
                println!("  {:<16} {}", page.path(), page.title());
            }
        }
        Command::Profile => match session.fetch_profile().await {
            Some(p) => print_json(&serde_json::to_value(p)?)?,
            None => return Err(anyhow!("Failed to load profile")),
        },
        Command::TopGainers => print_json(&client.top_gainers().await?)?,
        Command::LiveGainers => print_json(&client.live_intraday_gainers().await?)?,
        Command::IntraGainers => print_json(&client.live_intra_gainers().await?)?,
        Command::Market => print_json(&client.market_update().await?)?,
        Command::Stocks => print_json(&client.stocks_list().await?)?,
        Command::Chart { stock_id, datetime } => {
            print_json(&client.display_chart(&stock_id, &datetime).await?)?
        }
        Command::Query {
            db,
            ticker,
            stock_id,
            page,
            limit,
            date,
        } => {
            let q = DataQuery {
                db,
                ticker,
                stock_id,
                page,
                limit,
                date,
            };
            print_json(&client.data_query(&q).await?)?
        }
        Command::Purchases { date } => print_json(&client.purchases_by_date(&date).await?)?,
        Command::Health => print_json(&client.health().await?)?,
        Command::Process { name, action } => {
            print_json(&client.set_process_status(&name, action).await?)?
        }
        Command::Collections => print_json(&client.collections_overview().await?)?,
        Command::Collection {
            name,
            limit,
            prev,
            cursor,
            date,
            ticker,
        } => {
            let q = CollectionQuery {
                collection: name,
                limit,
                direction: if prev {
                    PageDirection::Prev
                } else {
                    PageDirection::Next
                },
                cursor,
                date,
                ticker,
            };
            print_json(&client.collection_data(&q).await?)?
        }
        Command::Export {
            collection,
            start,
            end,
            out,
        } => {
            let range = CollectionRange {
                collection,
                start_date: start,
                end_date: end,
            };
            let bytes = client.export_collection(&range).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(range.file_name()));
            std::fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
            println!("saved {} bytes to {}", bytes.len(), out.display());
        }
        Command::DeleteRange {
            collection,
            start,
            end,
        } => {
            let range = CollectionRange {
                collection,
                start_date: start,
                end_date: end,
            };
            print_json(&client.delete_collection_range(&range).await?)?
        }
        Command::Users => {
            for u in client.users().await? {
                println!(
                    "{:<8} {:<20} {:<32} {:<7} active={}",
                    u.gid,
                    u.username,
                    u.email,
                    u.usertype.as_str(),
                    u.active
                );
            }
        }
        Command::ResetPassword { new_password, gid } => {
            let target = gid.map_or(ResetTarget::Me, ResetTarget::User);
            print_json(&client.reset_password(&target, &new_password).await?)?
        }
        Command::Alert {
            title,
            message,
            gid,
        } => {
            let v = match gid {
                Some(gid) => client.send_alert_to_user(&gid, &title, &message).await?,
                None => client.broadcast_alert(&title, &message).await?,
            };
            print_json(&v)?
        }
        Command::Get { path } => print_json(&client.get_value(&path).await?)?,
        Command::Watch { view } => watch(view, session, settings).await?,
        Command::Shell => return Err(anyhow!("already in a shell")),
    }
    Ok(())
}

async fn watch(view: WatchView, session: &Session, settings: &Settings) -> Result<()> {
    let client = session.client().clone();
    let (_poller, mut rx) = Poller::spawn(settings.poll_interval(), move || {
        let client = client.clone();
        async move {
            match view {
                WatchView::Live => client.live_intraday_gainers().await,
                WatchView::Intra => client.live_intra_gainers().await,
                WatchView::Health => client.health().await,
            }
        }
    });
    let mut state = session.subscribe();

    loop {
        tokio::select! {
            res = rx.recv() => match res {
                Some(Ok(v)) => print_json(&v)?,
                Some(Err(e)) => eprintln!("{}", e.user_message()),
                None => break,
            },
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SessionState::Locked {
                    println!("session locked");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn shell(session: &Session, settings: &Settings) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state = session.subscribe();
    println!("gibsi shell; `help` for commands, ctrl-d to quit");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                session.record_activity(Activity::KeyPress);
                let words: Vec<&str> = line.split_whitespace().collect();
                if words.is_empty() {
                    continue;
                }
                match ShellLine::try_parse_from(words) {
                    Ok(ShellLine { command: Command::Shell }) => println!("already in a shell"),
                    Ok(ShellLine { command }) => {
                        if let Err(e) = execute(command, session, settings).await {
                            report(&e);
                        }
                    }
                    Err(e) => {
                        let _ = e.print();
                    }
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = *state.borrow_and_update();
                if now == SessionState::Locked {
                    println!("session locked");
                }
            }
        }
    }
    Ok(())
}

/// Prints the user-facing form of an error.
pub fn report(err: &anyhow::Error) {
    match err.downcast_ref::<ApiError>() {
        Some(api) => eprintln!("error: {}", api.user_message()),
        None => eprintln!("error: {:#}", err),
    }
}
