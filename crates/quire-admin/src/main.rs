//! quire operator CLI.
//!
//! Runs the same content and account operations the admin handlers use,
//! against the content directory and database named in the config file.
//!
//! ## Usage
//!
//! ```bash
//! quire init
//! quire create-user alice --password 'correct horse' --email alice@example.com
//! quire login alice --password 'correct horse'     # prints a token
//! quire --token <TOKEN> ls @alice/posts
//! quire --token <TOKEN> create @alice/posts --content '# Hello'
//! quire mv pages/draft.html pages/archive
//! ```
//!
//! Paths may start with a site prefix (`@alice/...`, `example.com/...`);
//! without one they refer to the default site.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use quire_kernel::content::{CreateFile, CreateFolder, Delete, Rename, Transfer};
use quire_kernel::token::unix_seconds;
use quire_kernel::{
    Accounts, AuthDb, AuthError, AuthorizationGate, ContentError, ContentOperations,
    DriverRegistry, FieldErrors, LocalBackend, NewUser, QuireConfig, SiteContent, Token,
};
use quire_types::path::split_parent;
use quire_types::{SitePrefix, resolve};

#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(about = "Manage quire content sites and accounts")]
struct Args {
    /// Configuration file (TOML). Missing file means defaults.
    #[arg(short, long, default_value = "quire.toml")]
    config: PathBuf,

    /// Override the content directory
    #[arg(long)]
    content_dir: Option<PathBuf>,

    /// Override the database DSN ("sqlite" for quire.db next to the content)
    #[arg(long)]
    database: Option<String>,

    /// Authentication token from `quire login`
    #[arg(long)]
    token: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the default site's content folders (and the schema)
    Init,
    /// Create a site for a custom domain
    CreateSite { name: String },
    /// Create a user with their own @username site
    CreateUser {
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: String,
        /// Also grant access to the default site
        #[arg(long)]
        default_site: bool,
    },
    /// Issue a password reset token and print it
    ResetPassword { user: String },
    /// Set a new password with a reset token
    SetPassword {
        #[arg(long)]
        reset_token: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and print an authentication token
    Login {
        /// Username, @username or email
        identifier: String,
        #[arg(long)]
        password: String,
    },
    /// Revoke the token given with --token
    Logout,
    /// List a folder
    Ls {
        #[arg(default_value = "")]
        path: String,
    },
    /// Print a file
    Cat { path: String },
    /// Create a folder
    Mkdir { path: String },
    /// Create a file in a folder. Posts and notes may omit the name.
    Create {
        folder: String,
        name: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Rename a file or folder in place
    Rename { path: String, new_name: String },
    /// Move a file or folder into another folder
    Mv { path: String, destination: String },
    /// Copy a file or folder into another folder
    Cp { path: String, destination: String },
    /// Delete a file or an empty folder
    Rm { path: String },
}

struct App {
    db: Option<Arc<AuthDb>>,
    ops: ContentOperations,
    token: Option<Token>,
    json: bool,
}

/// Split `@alice/posts/a.md` into its site and site-relative path.
fn site_path(raw: &str) -> (SitePrefix, String) {
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    let (site, rest) = resolve(&segments);
    (site, rest.join("/"))
}

impl App {
    fn open(args: &Args) -> Result<(Self, QuireConfig)> {
        let mut config = QuireConfig::load_or_default(&args.config)?;
        if let Some(dir) = &args.content_dir {
            config.content_dir = dir.clone();
        }
        if let Some(dsn) = &args.database {
            config.database = Some(dsn.clone());
        }
        config.validate()?;

        let vfs = LocalBackend::open(&config.content_dir, config.staging_dir())
            .with_context(|| format!("opening {}", config.content_dir.display()))?;

        let db = match config.database_dsn() {
            Some(dsn) => {
                let db = AuthDb::connect(&dsn, &DriverRegistry::with_defaults())
                    .with_context(|| format!("connecting to {dsn}"))?;
                Some(Arc::new(db))
            }
            None => None,
        };
        tracing::debug!(
            content_dir = %config.content_dir.display(),
            authless = db.is_none(),
            "opened content store"
        );
        let gate = match &db {
            Some(db) => AuthorizationGate::new(db.clone()),
            None => AuthorizationGate::authless(),
        };
        let token = args
            .token
            .as_deref()
            .map(Token::decode)
            .transpose()
            .context("decoding --token")?;

        let app = Self {
            db,
            ops: ContentOperations::new(Arc::new(vfs), gate),
            token,
            json: args.json,
        };
        Ok((app, config))
    }

    fn accounts(&self, config: &QuireConfig) -> Result<Accounts> {
        let Some(db) = &self.db else {
            bail!("no database configured; accounts need `database` in the config");
        };
        Ok(Accounts::new(db.clone())
            .secure(config.is_secure())
            .reset_token_ttl(config.reset_token_ttl()))
    }

    fn site(&self, site: SitePrefix) -> Result<SiteContent<'_>> {
        Ok(self.ops.site(site, self.token.as_ref())?)
    }

    fn print<T: serde::Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }
}

async fn run(args: Args) -> Result<()> {
    let (app, config) = App::open(&args)?;

    match args.command {
        Command::Init => {
            app.ops.init_site(&SitePrefix::default_site()).await?;
            println!("initialized {}", config.content_dir.display());
        }
        Command::CreateSite { name } => {
            app.accounts(&config)?.create_site(&name)?;
            let site = SitePrefix::from_site_name(&name);
            app.ops.init_site(&site).await?;
            println!("created site {site} at {}", config.content_site_url(&site));
        }
        Command::CreateUser {
            username,
            email,
            password,
            default_site,
        } => {
            let user = app.accounts(&config)?.create_user(&NewUser {
                username: username.clone(),
                email,
                password,
                default_site_member: default_site,
            })?;
            app.ops
                .init_site(&SitePrefix::from_site_name(&username))
                .await?;
            println!("created user {username} ({user})");
        }
        Command::ResetPassword { user } => {
            println!("{}", app.accounts(&config)?.issue_reset_token(&user)?);
        }
        Command::SetPassword {
            reset_token,
            password,
        } => {
            let user = app
                .accounts(&config)?
                .reset_password(&reset_token, &password, &password)?;
            println!("password updated for {user}; all sessions revoked");
        }
        Command::Login {
            identifier,
            password,
        } => {
            let cookie = app.accounts(&config)?.login(&identifier, &password)?;
            println!("{}", cookie.value());
        }
        Command::Logout => {
            app.accounts(&config)?.logout(app.token.as_ref())?;
            println!("logged out");
        }
        Command::Ls { path } => {
            let (site, path) = site_path(&path);
            let listing = app.site(site)?.list_folder(&path).await?;
            app.print(&listing, || {
                for entry in &listing.entries {
                    if entry.is_dir {
                        println!("{}/", entry.name);
                        continue;
                    }
                    let size = entry.size.map(|s| s.to_string()).unwrap_or_default();
                    let mtime = entry.mtime.map(|t| unix_seconds(t).to_string()).unwrap_or_default();
                    match &entry.title {
                        Some(title) => println!("{size:>10} {mtime:>12} {}  {title}", entry.name),
                        None => println!("{size:>10} {mtime:>12} {}", entry.name),
                    }
                }
            })?;
        }
        Command::Cat { path } => {
            let (site, path) = site_path(&path);
            let file = app.site(site)?.read_file(&path).await?;
            match file.text() {
                Some(text) => print!("{text}"),
                None => bail!("{} is not UTF-8 ({} bytes)", file.path, file.size),
            }
        }
        Command::Mkdir { path } => {
            let (site, path) = site_path(&path);
            let (parent, name) = split_parent(&path);
            let outcome = app
                .site(site)?
                .create_folder(&CreateFolder {
                    parent_folder: parent.to_string(),
                    name: name.to_string(),
                })
                .await?;
            app.print(&outcome, || match &outcome.already_exists {
                Some(url) => println!("already exists: {url}"),
                None => println!("{}", outcome.path),
            })?;
        }
        Command::Create {
            folder,
            name,
            content,
        } => {
            let (site, folder) = site_path(&folder);
            let outcome = app
                .site(site)?
                .create_file(&CreateFile {
                    parent_folder: folder,
                    name: name.unwrap_or_default(),
                    content,
                })
                .await?;
            app.print(&outcome, || match &outcome.already_exists {
                Some(url) => println!("already exists: {url}"),
                None => println!("{}", outcome.path),
            })?;
        }
        Command::Rename { path, new_name } => {
            let (site, path) = site_path(&path);
            let (parent, old_name) = split_parent(&path);
            let outcome = app
                .site(site)?
                .rename(&Rename {
                    parent_folder: parent.to_string(),
                    old_name: old_name.to_string(),
                    new_name,
                })
                .await?;
            app.print(&outcome, || println!("{}", outcome.path))?;
        }
        Command::Mv { path, destination } => transfer(&app, &path, &destination, false).await?,
        Command::Cp { path, destination } => transfer(&app, &path, &destination, true).await?,
        Command::Rm { path } => {
            let (site, path) = site_path(&path);
            let outcome = app.site(site)?.delete(&Delete { path }).await?;
            app.print(&outcome, || println!("deleted {}", outcome.path))?;
        }
    }
    Ok(())
}

async fn transfer(app: &App, path: &str, destination: &str, copy: bool) -> Result<()> {
    let (site, path) = site_path(path);
    let (dest_site, destination_folder) = site_path(destination);
    if site != dest_site {
        bail!("cannot transfer between sites ({site} and {dest_site})");
    }
    let req = Transfer {
        path,
        destination_folder,
    };
    let content = app.site(site)?;
    let outcome = if copy {
        content.copy(&req).await?
    } else {
        content.move_to(&req).await?
    };
    app.print(&outcome, || println!("{}", outcome.path))
}

fn field_errors(err: &anyhow::Error) -> Option<&FieldErrors> {
    if let Some(err) = err.downcast_ref::<ContentError>() {
        return err.field_errors();
    }
    match err.downcast_ref::<AuthError>() {
        Some(AuthError::ValidationFailed(errors)) => Some(errors),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match field_errors(&err) {
                Some(errors) => {
                    for (field, messages) in errors.iter() {
                        for message in messages {
                            eprintln!("{field}: {message}");
                        }
                    }
                }
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
