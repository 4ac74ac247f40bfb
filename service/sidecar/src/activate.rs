use crate::errors::*;
use crate::state::SidecarState;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use error::StringError;
use log::{error, info, warn};
use result::Result;
use std::time::Duration;
use term_colors::*;
use tokio::io::AsyncWriteExt;

/// Root of the volume shared between this sidecar and the function container.
pub const SHARED_DIR: &str = "/shared";
/// Where function code is materialized; wiped and recreated on every activation.
pub const FUNC_DIR: &str = "/shared/func";

const FUNCTION_PORT: u16 = 8081;
const PING_POLL_INTERVAL: Duration = Duration::from_millis(10);
const PING_POLL_BUDGET: Duration = Duration::from_millis(450);

pub enum Code {
    Inline(Vec<u8>),
    Link(String),
}

/// Runs the full `Activate` sequence: sets `activating`, always clears it on
/// return, and marks the pod for termination on any failure.
pub async fn activate(state: &SidecarState, code: Code) -> Result<()> {
    if state.terminate().await {
        return Err(AlreadyTerminating {}.into());
    }
    state.set_activating(true).await;
    let result = run(code).await;
    state.set_activating(false).await;
    match result {
        Ok(()) => {
            state.reset_timestamps().await;
            info!("Pod entered the {} phase", green("Active"));
            Ok(())
        }
        Err(err) => {
            state.set_terminate(true).await;
            error!("Activation failed, marking pod for termination: {}", err);
            Err(err)
        }
    }
}

async fn run(code: Code) -> Result<()> {
    reset_func_folder().await?;
    match code {
        Code::Inline(bytes) => write_function_js(&bytes).await?,
        Code::Link(link) => materialize_from_link(&link).await?,
    }
    signal_activate().await?;
    poll_ping().await
}

async fn reset_func_folder() -> Result<()> {
    let _ = tokio::fs::remove_dir_all(FUNC_DIR).await;
    tokio::fs::create_dir_all(FUNC_DIR)
        .await
        .map_err(|cause| FuncFolderError {
            path: FUNC_DIR.to_string(),
            cause,
        })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(FUNC_DIR, std::fs::Permissions::from_mode(0o777))
            .await
            .map_err(|cause| FuncFolderError {
                path: FUNC_DIR.to_string(),
                cause,
            })?;
    }
    Ok(())
}

async fn write_function_js(bytes: &[u8]) -> Result<()> {
    let path = format!("{}/function.js", FUNC_DIR);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|cause| CodeWriteError {
            path: path.clone(),
            cause,
        })?;
    file.write_all(bytes)
        .await
        .map_err(|cause| CodeWriteError { path, cause })?;
    Ok(())
}

/// Fetches `link` with retry/backoff, then either unzips it into [FUNC_DIR]
/// (if the path looks like a `.zip`) or writes it as `function.js` verbatim.
async fn materialize_from_link(link: &str) -> Result<()> {
    let mut backoff = ExponentialBackoff::default();
    let bytes = loop {
        let attempt = async {
            reqwest::get(link)
                .await?
                .error_for_status()?
                .bytes()
                .await
        }
        .await;
        match attempt {
            Ok(bytes) => break bytes,
            Err(err) => match backoff.next_backoff() {
                Some(duration) => {
                    warn!(
                        "Failed to fetch function code from {}, retrying: {:?}",
                        cyan(link),
                        err
                    );
                    tokio::time::sleep(duration).await;
                }
                None => {
                    return Err(CodeFetchError {
                        link: link.to_string(),
                        cause: StringError::from(err.to_string()),
                    }
                    .into())
                }
            },
        }
    };
    if link.contains(".zip") {
        unzip(bytes.to_vec(), link).await
    } else {
        write_function_js(&bytes).await
    }
}

async fn unzip(bytes: Vec<u8>, link: &str) -> Result<()> {
    let link = link.to_string();
    tokio::task::spawn_blocking(move || -> std::result::Result<(), String> {
        let reader = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(reader).map_err(|err| err.to_string())?;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|err| err.to_string())?;
            let dest = match entry.enclosed_name() {
                Some(name) => std::path::Path::new(FUNC_DIR).join(name),
                None => continue,
            };
            if entry.is_dir() {
                std::fs::create_dir_all(&dest).map_err(|err| err.to_string())?;
                continue;
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|err| err.to_string())?;
            }
            let mut out = std::fs::File::create(&dest).map_err(|err| err.to_string())?;
            std::io::copy(&mut entry, &mut out).map_err(|err| err.to_string())?;
        }
        Ok(())
    })
    .await
    .map_err(|err| CodeUnzipError {
        link: link.clone(),
        cause: StringError::from(err.to_string()),
    })?
    .map_err(|err| {
        CodeUnzipError {
            link,
            cause: StringError::from(err),
        }
        .into()
    })
}

async fn signal_activate() -> Result<()> {
    let url = format!("http://localhost:{}/api/activate", FUNCTION_PORT);
    let response = reqwest::get(&url).await.map_err(|cause| ActivationSignalFailure {
        cause: StringError::from(cause.to_string()),
    })?;
    let status = response.status();
    if status.as_u16() == 500 {
        let body = response.text().await.unwrap_or_default();
        return Err(ActivationRejected {
            status: status.as_u16(),
            body,
        }
        .into());
    }
    Ok(())
}

async fn poll_ping() -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("http://localhost:{}/api/ping", FUNCTION_PORT);
    let deadline = tokio::time::Instant::now() + PING_POLL_BUDGET;
    loop {
        if let Ok(response) = client.head(&url).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ActivationTimedOut {}.into());
        }
        tokio::time::sleep(PING_POLL_INTERVAL).await;
    }
}
