use anyhow::Result;
use chrono::{DateTime, Utc};

use aitr_runtime::Engine;
use aitr_schemas::{Personality, TraderId};

use super::{load_personality, parse_trader_id};

pub async fn create(engine: &Engine, name: &str, personality_path: &str) -> Result<()> {
    let personality: Personality = load_personality(personality_path)?;
    let trader = engine.create_trader(name, personality).await?;
    print_trader(&trader);
    Ok(())
}

pub async fn list(engine: &Engine) -> Result<()> {
    for trader in engine.list_traders().await? {
        print_trader(&trader);
    }
    Ok(())
}

pub async fn show(engine: &Engine, id: &str) -> Result<()> {
    let trader_id = parse_trader_id(id)?;
    let trader = engine.get_trader(trader_id).await?;
    print_trader(&trader);
    let portfolio = engine.get_portfolio(trader_id).await?;
    println!(
        "portfolio cash_micros={} positions_open={}",
        portfolio.cash_micros,
        portfolio.open_positions().count()
    );
    Ok(())
}

pub async fn start(engine: &Engine, id: &str) -> Result<()> {
    let trader_id = parse_trader_id(id)?;
    engine.start_trader(trader_id).await?;
    println!("trader_id={trader_id} state=running");
    Ok(())
}

pub async fn stop(engine: &Engine, id: &str) -> Result<()> {
    let trader_id = parse_trader_id(id)?;
    engine.stop_trader(trader_id).await?;
    println!("trader_id={trader_id} state=stopped");
    Ok(())
}

pub async fn pause(engine: &Engine, id: &str) -> Result<()> {
    let trader_id = parse_trader_id(id)?;
    engine.pause_trader(trader_id).await?;
    println!("trader_id={trader_id} state=paused");
    Ok(())
}

pub async fn delete(engine: &Engine, id: &str) -> Result<()> {
    let trader_id = parse_trader_id(id)?;
    engine.delete_trader(trader_id).await?;
    println!("trader_id={trader_id} deleted=true");
    Ok(())
}

pub async fn learn(engine: &Engine, id: &str) -> Result<()> {
    let trader_id = parse_trader_id(id)?;
    engine.trigger_learning(trader_id).await?;
    println!("trader_id={trader_id} learning_triggered=true");
    Ok(())
}

pub async fn decisions(engine: &Engine, id: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<()> {
    let trader_id = parse_trader_id(id)?;
    let decisions = engine.list_decisions(trader_id, since, until).await?;
    for d in decisions {
        println!(
            "{} {} symbol={} type={:?} executed={} rejected_by={:?}",
            d.created_at, d.id, d.symbol, d.decision_type, d.executed, d.rejected_by
        );
    }
    Ok(())
}

pub async fn weight_history(engine: &Engine, id: &str) -> Result<()> {
    let trader_id = parse_trader_id(id)?;
    for entry in engine.list_weight_history(trader_id).await? {
        println!("{} reason={} new_weights={:?}", entry.at, entry.reason, entry.new_weights);
    }
    Ok(())
}

fn print_trader(trader: &aitr_schemas::Trader) {
    println!(
        "{} name={} state={:?} portfolio_id={}",
        trader.id, trader.name, trader.state, trader.portfolio_id
    );
}

pub fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
