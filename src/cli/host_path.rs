use std::path::{Path, PathBuf};

use serde_json::{json, Value};

/// Name the browser knows the host by. Also the manifest file name.
pub const HOST_NAME: &str = "com.sitetimer.host";

/// The host binary is installed next to the cli.
pub fn to_host_path(cli_path: &Path) -> PathBuf {
    let mut path = cli_path.to_path_buf();
    path.set_file_name("sitetimer-host");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

pub fn host_manifest(cli_path: &Path, extension_id: &str) -> Value {
    json!({
        "name": HOST_NAME,
        "description": "Tracks time spent on monitored domains",
        "path": to_host_path(cli_path),
        "type": "stdio",
        "allowed_origins": [format!("chrome-extension://{extension_id}/")],
    })
}
