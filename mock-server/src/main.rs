use mock_server::{AppState, Auth, Firmware};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let name = std::env::var("FIRMWARE_NAME").unwrap_or_else(|_| "firmware.bin".to_string());
    let last_modified =
        std::env::var("LAST_MODIFIED").unwrap_or_else(|_| "Thu, 01 Jan 1970 00:00:00 GMT".to_string());
    let auth = match std::env::var("BEARER_TOKEN") {
        Ok(token) => Auth::Bearer(token),
        Err(_) => Auth::None,
    };

    let mut state = AppState::new(auth);
    if let Ok(path) = std::env::var("FIRMWARE_PATH") {
        let image = std::fs::read(&path)?;
        println!("serving {path} ({} bytes) as /{name}", image.len());
        state = state.with_firmware(&name, Firmware::new(image, &last_modified));
    }

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("listening on {addr}");
    mock_server::run(listener, state).await
}
