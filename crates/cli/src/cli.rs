//! Command line definition.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "product-catalog")]
#[command(version)]
#[command(about = "Durable workflow orchestrator for the product catalog pipeline")]
#[command(long_about = "Turns product photos into catalog-ready drafts: detects labels, infers \
                        attributes and renders a virtual try-on image. Executions are persisted \
                        under .product-catalog/ and can be resumed after an interruption.")]
pub struct Cli {
    /// Project root containing the `.product-catalog/` directory
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Write logs to stderr as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Override the whole-execution timeout from config.toml
    #[arg(long, global = true, value_name = "SECS")]
    pub execution_timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the catalog workflow: labels, attribution and try-on image
    Catalog {
        #[command(flatten)]
        start: StartArgs,

        /// Existing human-model image under human-model-images/
        #[arg(long)]
        human_model_image_key: Option<String>,
    },
    /// Start the attribution-only workflow
    Attribution {
        #[command(flatten)]
        start: StartArgs,
    },
    /// Show one execution with its full attempt history
    Status {
        execution_id: Uuid,

        #[arg(long)]
        json: bool,
    },
    /// List every stored execution
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print the product draft of a product id as JSON
    Draft { product_id: String },
    /// Resume executions left running by an interrupted process and wait for them
    Resume {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Object store key of the source image, under input/
    #[arg(long)]
    pub object_key: String,

    #[arg(long)]
    pub product_id: String,

    /// Upload this local file to the object key before starting
    #[arg(long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Block until the execution reaches a terminal status
    #[arg(long, help = "Wait for the execution; without it the run continues on the next `resume`")]
    pub wait: bool,

    #[arg(long)]
    pub json: bool,
}
