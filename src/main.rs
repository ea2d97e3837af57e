use auth_data_server::server::run_from_env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    run_from_env().await?;
    Ok(())
}
