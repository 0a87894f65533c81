use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use presence_core::{BatchSummary, Detection, Embedding};
use presence_store::{AttendanceService, PlaintextPassword, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "presence", about = "Face attendance CLI")]
struct Cli {
    /// Database file
    #[arg(long, global = true, env = "PRESENCE_DB_PATH")]
    db: Option<PathBuf>,

    /// Euclidean distance threshold for a positive match
    #[arg(long, global = true, default_value_t = presence_core::DEFAULT_MATCH_THRESHOLD)]
    threshold: f32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face
    Register {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// JSON array of 128 floats
        #[arg(long, conflicts_with = "detections", required_unless_present = "detections")]
        embedding: Option<PathBuf>,
        /// JSON array of detections; exactly one face must be present
        #[arg(long)]
        detections: Option<PathBuf>,
    },
    /// List registered faces
    List,
    /// Change the display name of a registered face
    Rename { id: String, name: String },
    /// Remove a registered face
    Remove { id: String },
    /// Mark attendance for the faces in a frame
    Mark {
        /// JSON array of detections
        #[arg(long)]
        detections: PathBuf,
    },
    /// Show attendance records
    Logs {
        /// Case-insensitive substring filter
        #[arg(long)]
        filter: Option<String>,
    },
    /// Replace an attendance record
    EditLog { old: String, new: String },
    /// Delete an attendance record
    DeleteLog { value: String },
    /// Export attendance records as CSV
    ExportCsv {
        #[arg(long)]
        filter: Option<String>,
        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write a backup of all data
    Backup {
        #[arg(long)]
        out: PathBuf,
    },
    /// Replace all data with a backup
    Restore {
        file: PathBuf,
        /// Confirm overwriting existing data
        #[arg(long)]
        yes: bool,
    },
    /// Show or change capture settings
    Settings {
        /// Minimum minutes between records for the same person
        #[arg(long)]
        interval: Option<u32>,
    },
    /// Change admin credentials
    Credentials {
        /// Current password
        #[arg(long)]
        old: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Check admin credentials
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Delete all faces, records and settings
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(presence_store::default_db_path);
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    let mut service = AttendanceService::open(Arc::new(store))?.with_threshold(cli.threshold);

    match cli.command {
        Commands::Register {
            id,
            name,
            embedding,
            detections,
        } => {
            match (embedding, detections) {
                (Some(path), _) => service.register(&id, &name, read_json::<Embedding>(&path)?)?,
                (None, Some(path)) => {
                    let detections: Vec<Detection> = read_json(&path)?;
                    service.register_from_detections(&id, &name, &detections)?
                }
                (None, None) => bail!("either --embedding or --detections is required"),
            }
            println!("Registered {name} (ID: {id})");
        }
        Commands::List => {
            let faces = service.list_faces()?;
            if faces.is_empty() {
                println!("No faces registered");
            }
            for face in faces {
                println!("{}\t{}", face.id, face.name);
            }
        }
        Commands::Rename { id, name } => {
            if !service.rename_face(&id, &name)? {
                bail!("no registered face with ID {id}");
            }
            println!("Renamed {id} to {name}");
        }
        Commands::Remove { id } => {
            if !service.delete_face(&id)? {
                bail!("no registered face with ID {id}");
            }
            println!("Removed {id}");
        }
        Commands::Mark { detections } => {
            let detections: Vec<Detection> = read_json(&detections)?;
            let report = service.mark_attendance(&detections)?;
            for outcome in &report.outcomes {
                println!("{outcome}");
            }
            match report.summary() {
                BatchSummary::Marked(n) => println!("Attendance marked for {n} face(s)."),
                BatchSummary::UnknownFace => println!("Unknown face detected."),
                BatchSummary::AllThrottled => println!("No registered faces detected."),
            }
        }
        Commands::Logs { filter } => {
            for line in service.attendance_logs(filter.as_deref())? {
                println!("{line}");
            }
        }
        Commands::EditLog { old, new } => {
            if !service.edit_log(&old, &new)? {
                bail!("no matching attendance record");
            }
            println!("Record updated");
        }
        Commands::DeleteLog { value } => {
            if !service.delete_log(&value)? {
                bail!("no matching attendance record");
            }
            println!("Record deleted");
        }
        Commands::ExportCsv { filter, out } => {
            let csv = service.export_csv(filter.as_deref())?;
            match out {
                Some(path) => write_file(&path, &csv)?,
                None => print!("{csv}"),
            }
        }
        Commands::Backup { out } => {
            write_file(&out, &service.export_backup()?)?;
            println!("Backup written to {}", out.display());
        }
        Commands::Restore { file, yes } => {
            if !yes {
                bail!("restore replaces all existing data; pass --yes to confirm");
            }
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            service.restore_backup(&text)?;
            println!("Data restored from {}", file.display());
        }
        Commands::Settings { interval } => {
            let config = match interval {
                Some(minutes) => service.save_interval(minutes)?,
                None => service.config()?,
            };
            println!("admin_username: {}", config.admin_username);
            println!(
                "min_capture_interval_minutes: {}",
                config.min_capture_interval_minutes
            );
        }
        Commands::Credentials {
            old,
            username,
            password,
        } => {
            let password = password.map(PlaintextPassword::new);
            let config = service.change_credentials(
                &PlaintextPassword::new(old),
                username.as_deref(),
                password.as_ref(),
            )?;
            println!("Credentials updated for {}", config.admin_username);
        }
        Commands::Login { username, password } => {
            if !service.login(&username, &PlaintextPassword::new(password))? {
                bail!("invalid username or password");
            }
            println!("Login successful");
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes all data; pass --yes to confirm");
            }
            service.reset_all()?;
            println!("All data reset");
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}
