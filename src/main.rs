use nirvana_astro_lib::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nirvana_astro_lib::run(Config::from_env()).await
}
