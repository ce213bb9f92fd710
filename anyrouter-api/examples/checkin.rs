use anyrouter_api::{ApiError, Client};

#[tokio::main]
pub async fn main() -> Result<(), ApiError> {
    let client = Client::new("access_token")?;

    let _res = client.checkin().await?;
    Ok(())
}
