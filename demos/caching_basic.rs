//! # Basic Caching Example
//!
//! This example demonstrates the cache contract across backends:
//! - Building caches from TOML configuration
//! - Cache hits vs misses, including falsy values
//! - Batch reads and writes
//! - Falling back to the null cache when redis is down

use cacher::prelude::*;
use std::time::Instant;

const CONFIG: &str = r#"
[cache.local]
backend = "shared_memory"
namespace = "demo:local:"
default_ttl = 300

[cache.sessions]
backend = "redis"
namespace = "demo:sessions:"
default_ttl = 3600
fallback_to_null = true

[cache.sessions.redis]
connect_timeout_ms = 500
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🚀 Cacher Basic Caching Example");
    println!("===============================");

    // 1. Cache Setup
    let config = AppConfig::from_toml_str(CONFIG)?;
    let hub = CacheHub::from_config(&config).await?;
    println!("✅ Caches registered: {:?}", hub.list());

    // 2. Hits and misses
    println!("\n🗄️  Shared memory cache");
    println!("----------------------");

    let local = hub.get("local")?;
    println!("Miss returns default: {}", local.get("counter", json!("none")).await);

    local.set("counter", json!(0), Ttl::Default).await;
    println!("Falsy hit: {}", local.get("counter", json!("none")).await);
    println!("has(counter): {}", local.has("counter").await);

    // 3. Batch operations
    println!("\n📦 Batch operations");
    println!("-------------------");

    let start = Instant::now();
    local
        .set_multiple(
            vec![
                (json!("a"), json!({"id": 1})),
                (json!(2), json!([1, 2, 3])),
            ],
            Ttl::Interval(Interval::minutes(5)),
        )
        .await?;
    let values = local
        .get_multiple(vec![json!("a"), json!(2), json!("missing")], Value::Null)
        .await?;
    println!("Batch read in {:?}: {}", start.elapsed(), Value::Object(values));

    match local.get_multiple(vec![json!(1.5)], Value::Null).await {
        Ok(_) => println!("❌ Float key accepted"),
        Err(e) => println!("✅ Float key rejected: {}", e),
    }

    // 4. Redis, or the null cache standing in for it
    println!("\n🔌 Sessions cache");
    println!("-----------------");

    let sessions = hub.get("sessions")?;
    let stored = sessions.set("user:1", json!({"name": "John"}), Ttl::Default).await;
    if stored {
        println!("✅ Redis stored the session");
    } else {
        println!("💡 Redis unavailable, sessions run on the null cache");
        println!("💡 Start Redis: docker run -d --name redis -p 6379:6379 redis:7-alpine");
    }
    println!("Session: {}", sessions.get("user:1", Value::Null).await);

    println!("\n🎉 Done");
    Ok(())
}
