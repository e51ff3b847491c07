//! Subcommand handlers

use crate::style::*;
use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use ladder_engine::config::EngineConfig;
use ladder_engine::sweep_monitor::{spawn_sweep_monitor, SweepMonitorConfig};
use ladder_engine::{Caller, LadderEngine, Player, SqliteStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub struct Context {
    pub engine: Arc<LadderEngine<SqliteStore>>,
    pub ladder: String,
    pub caller: Caller,
    pub json: bool,
}

impl Context {
    /// Print `value` as JSON, or hand it to `human` for styled output
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

fn describe(player: &Player) -> String {
    format!(
        "{} (rank {}, tier {})",
        player.external_id, player.rank, player.tier
    )
}

pub fn signup(ctx: &Context) -> Result<()> {
    let player = ctx.engine.signup(&ctx.caller, &ctx.ladder)?;
    ctx.emit(&player, |p| {
        print_success(&format!("Signed up to {} as {}", ctx.ladder, describe(p)))
    })
}

pub fn leave(ctx: &Context) -> Result<()> {
    let player = ctx.engine.leave(&ctx.caller, &ctx.ladder)?;
    ctx.emit(&player, |p| {
        print_success(&format!("{} left {}", p.external_id, ctx.ladder))
    })
}

pub fn kick(ctx: &Context, target: &str) -> Result<()> {
    let player = ctx.engine.kick(&ctx.caller, &ctx.ladder, target)?;
    ctx.emit(&player, |p| {
        print_success(&format!("Kicked {} from {}", describe(p), ctx.ladder))
    })
}

pub fn shuffle(ctx: &Context) -> Result<()> {
    let players = ctx.engine.shuffle(&ctx.caller, &ctx.ladder)?;
    ctx.emit(&players, |players| {
        print_success(&format!("Shuffled {} players", players.len()));
        print_ranking(players);
    })
}

pub fn challenge(ctx: &Context, opponent: &str) -> Result<()> {
    let challenge = ctx.engine.challenge(&ctx.caller, &ctx.ladder, opponent)?;
    ctx.emit(&challenge, |c| {
        print_success(&format!(
            "Challenge #{} issued to {}, report before {}",
            c.id,
            opponent,
            c.deadline.format("%Y-%m-%d %H:%M UTC")
        ))
    })
}

pub fn cancel(ctx: &Context, target: Option<&str>) -> Result<()> {
    let report = ctx.engine.cancel(&ctx.caller, &ctx.ladder, target)?;
    ctx.emit(&report, |r| {
        print_success(&format!(
            "Challenge #{} {}",
            r.outcome.challenge.id, r.outcome.challenge.state
        ));
        for update in r.outcome.strike_updates() {
            print_key_value(&update.external_id, &format!("{} strikes", update.strikes));
        }
        for kicked in &r.kicked {
            print_warning(&format!("{} was kicked for too many strikes", kicked));
        }
    })
}

pub fn report(ctx: &Context, won: bool, target: Option<&str>) -> Result<()> {
    let outcome = ctx.engine.report(&ctx.caller, &ctx.ladder, won, target)?;
    ctx.emit(&outcome, |o| {
        print_success(&format!(
            "Challenge #{} played, {} won",
            o.challenge.id,
            o.winner().external_id
        ));
        print_key_value("Challenger", &describe(&o.challenger));
        print_key_value("Opponent", &describe(&o.opponent));
        if o.challenge.title_awarded {
            print_key_value_colored("Title", &o.winner().external_id, colors::YELLOW);
        }
    })
}

pub fn dispute(ctx: &Context, target: &str) -> Result<()> {
    let challenge = ctx.engine.dispute(&ctx.caller, &ctx.ladder, target)?;
    ctx.emit(&challenge, |c| {
        print_success(&format!(
            "Challenge #{} reopened until {}",
            c.id,
            c.deadline.format("%Y-%m-%d %H:%M UTC")
        ))
    })
}

pub fn sweep(ctx: &Context) -> Result<()> {
    let now = ctx.engine.now();
    let report = ctx.engine.sweep(&ctx.caller, &ctx.ladder, now)?;
    ctx.emit(&report, |r| {
        print_success(&format!("{} challenges timed out", r.outcomes.len()));
        for kicked in &r.kicked {
            print_warning(&format!("{} was kicked for too many strikes", kicked));
        }
    })
}

pub fn strikes(ctx: &Context, target: &str, delta: i32) -> Result<()> {
    let report = ctx.engine.strikes(&ctx.caller, &ctx.ladder, target, delta)?;
    ctx.emit(&report, |r| {
        print_key_value(
            &r.external_id,
            &format!("{}/{} strikes", r.strikes, r.max_strikes),
        );
        if r.kicked {
            print_warning(&format!("{} was kicked for too many strikes", r.external_id));
        }
    })
}

pub fn timeout(ctx: &Context, target: &str, days: u32) -> Result<()> {
    let player = ctx.engine.timeout(&ctx.caller, &ctx.ladder, target, days)?;
    ctx.emit(&player, |p| {
        print_success(&format!("{} timed out for {} days", p.external_id, days))
    })
}

pub fn status(ctx: &Context) -> Result<()> {
    let status = ctx.engine.status(&ctx.caller, &ctx.ladder)?;
    ctx.emit(&status, |s| {
        print_header(&format!("{} in {}", s.player.external_id, ctx.ladder));
        print_key_value("Rank", &s.player.rank.to_string());
        print_key_value_colored(
            "Tier",
            &s.player.tier.to_string(),
            tier_color(s.player.tier),
        );
        print_key_value(
            "Record",
            &format!("{}W {}L, {} titles", s.player.wins, s.player.losses, s.player.titles),
        );
        print_key_value("Strikes", &s.player.strikes.to_string());
        if let Some(until) = s.cooldown_until {
            print_key_value_colored("Cooldown until", &until.to_rfc3339(), colors::YELLOW);
        }
        if let Some(until) = s.protection_until {
            print_key_value_colored("Protected until", &until.to_rfc3339(), colors::CYAN);
        }

        print_section("Active challenge");
        match (&s.active_challenge, &s.opponent) {
            (Some(c), Some(opponent)) => {
                print_key_value("Id", &format!("#{}", c.id));
                print_key_value("Opponent", &describe(opponent));
                print_key_value("Deadline", &c.deadline.to_rfc3339());
            }
            _ => println!("  {}", style_dim("none")),
        }
        println!();
    })
}

pub fn candidates(ctx: &Context) -> Result<()> {
    let players = ctx.engine.possible_challenges(&ctx.caller, &ctx.ladder)?;
    ctx.emit(&players, |players| {
        if players.is_empty() {
            print_warning("Nobody can be challenged right now");
        } else {
            print_ranking(players);
        }
    })
}

pub fn ranking(ctx: &Context) -> Result<()> {
    let players = ctx.engine.ranking(&ctx.ladder)?;
    ctx.emit(&players, |players| {
        print_header(&format!("Ranking of {}", ctx.ladder));
        print_ranking(players);
    })
}

fn print_ranking(players: &[Player]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Rank", "Tier", "Player", "W", "L", "Titles", "Strikes"]);
    for p in players {
        table.add_row(vec![
            Cell::new(p.rank),
            Cell::new(p.tier).fg(tier_cell_color(p.tier)),
            Cell::new(&p.external_id),
            Cell::new(p.wins),
            Cell::new(p.losses),
            Cell::new(p.titles),
            Cell::new(p.strikes),
        ]);
    }
    println!("{}", table);
}

pub fn config_get(ctx: &Context, name: &str, global: bool) -> Result<()> {
    let scope = (!global).then_some(ctx.ladder.as_str());
    let value = ctx.engine.config_get(&ctx.caller, scope, name)?;
    ctx.emit(&value, |v| print_key_value(name, v))
}

pub fn config_set(ctx: &Context, name: &str, value: &str, global: bool) -> Result<()> {
    let scope = (!global).then_some(ctx.ladder.as_str());
    ctx.engine.config_set(&ctx.caller, scope, name, value)?;
    ctx.emit(&value, |v| print_success(&format!("{} = {}", name, v)))
}

pub async fn watch(ctx: &Context, config: &EngineConfig) -> Result<()> {
    let ladders = if config.sweep_ladders.is_empty() {
        vec![ctx.ladder.clone()]
    } else {
        config.sweep_ladders.clone()
    };
    let monitor = spawn_sweep_monitor(
        ctx.engine.clone(),
        SweepMonitorConfig {
            poll_interval_secs: config.sweep_interval_secs,
            ladders: ladders.clone(),
        },
    );
    let mut events = ctx.engine.subscribe();
    info!("Watching {:?}, press Ctrl-C to stop", ladders);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => ctx.emit(&event, |e| {
                    println!("{} standings changed ({:?})", style_bold(&e.ladder), e.reason)
                })?,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    print_warning(&format!("Missed {} standings updates", n));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    monitor.abort();
    println!("{}", style_yellow("Stopped"));
    Ok(())
}
