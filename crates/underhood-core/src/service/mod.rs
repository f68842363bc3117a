use std::time::Duration;

use anyhow::Result;

use crate::cli::{LogRotation, ServeArgs, TreeArgs, XrefArgs};
use crate::filetree::FileTree;
use crate::telemetry;
use crate::ticket::Ticket;
use crate::translate::{Casing, SearchMode};
use crate::xref::XrefResult;

pub mod error;
pub mod http;
pub mod server;

pub use error::ApiError;
pub use server::{Gateway, XrefRequest};

const ONE_SHOT_WALL_TIME: Duration = Duration::from_secs(10);

/// Launch the HTTP gateway using the provided CLI arguments.
pub async fn serve(args: ServeArgs) -> Result<()> {
    let config = server::ServeConfig::try_from_args(args)?;
    let _telemetry = telemetry::init(config.log_dir.as_deref(), config.log_rotation)?;
    let server = server::UnderhoodServer::new(config);
    server.run().await
}

/// Answer one cross-reference request against the index and exit.
pub async fn xref(args: XrefArgs) -> Result<XrefResult> {
    let _telemetry = telemetry::init(None, LogRotation::Never)?;
    let gateway = Gateway::open(&args.index, ONE_SHOT_WALL_TIME).await?;
    let request = XrefRequest {
        selection: args.selection,
        reference: args.ticket.as_deref().map(Ticket::parse).unwrap_or_default(),
        casing: Casing::parse_or_default(args.casing.as_deref()),
        mode: SearchMode::parse_or_default(args.mode.as_deref()),
    };
    Ok(gateway.search_xref(&request).await?)
}

/// Print one level of the file tree and exit.
pub async fn tree(args: TreeArgs) -> Result<FileTree> {
    let _telemetry = telemetry::init(None, LogRotation::Never)?;
    let gateway = Gateway::open(&args.index, ONE_SHOT_WALL_TIME).await?;
    Ok(gateway.file_tree(&Ticket::parse(&args.top)).await?)
}
