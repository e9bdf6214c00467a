use serde_json::json;

use knotter::config::Config;
use knotter::{logger, HandlerSpec, Server};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    logger::init(&cfg);

    let mut server = Server::new(cfg);

    server.add_handler(HandlerSpec::new("^/page1").get(|h| {
        h.end("done");
        Ok(())
    }))?;

    server.add_handler(
        HandlerSpec::new(r"^/page/(.+?)/(\d+)")
            .use_sessions(true)
            .get(|h| {
                let session = h.sessions()?;
                let count = session
                    .get("count")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    + 1;
                session.set("count", count);

                let body = json!({ "args": h.params.args, "count": count }).to_string();
                h.write_head(
                    hyper::StatusCode::OK,
                    &[("Content-Type", "application/json")],
                );
                h.end(body);
                Ok(())
            }),
    )?;

    server.serve()?;
    Ok(())
}
