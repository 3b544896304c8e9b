use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use art_gallery::gallery::Gallery;
use art_gallery::registry::{AssetId, AssetLedger, HolderId, TokenRegistry};
use art_gallery::settlement::{Amount, CashAccounts};

#[derive(Parser)]
#[command(name = "art-gallery", version, about = "Operator-curated marketplace ledger")]
struct Cli {
    /// JSON state file holding the gallery, the registry, and cash accounts.
    #[arg(long, global = true, default_value = "gallery.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh state file with the given operator identity.
    Init {
        #[arg(long)]
        operator: HolderId,
    },
    /// Mint an asset; held by --holder when given, by the operator otherwise.
    Mint {
        #[arg(long = "as")]
        caller: HolderId,
        #[arg(long)]
        id: AssetId,
        #[arg(long)]
        uri: String,
        #[arg(long)]
        price: Amount,
        #[arg(long)]
        holder: Option<HolderId>,
    },
    /// Overwrite the listing price of an asset (0 delists it).
    SetPrice {
        #[arg(long = "as")]
        caller: HolderId,
        #[arg(long)]
        id: AssetId,
        #[arg(long)]
        price: Amount,
    },
    /// Print the current listed price of an asset.
    Price {
        #[arg(long)]
        id: AssetId,
    },
    /// Print the current holder of an asset.
    Owner {
        #[arg(long)]
        id: AssetId,
    },
    /// Print the assets held by an identity.
    Holdings {
        #[arg(long)]
        holder: HolderId,
    },
    /// Buy an asset by paying exactly its listed price.
    Buy {
        #[arg(long = "as")]
        caller: HolderId,
        #[arg(long)]
        id: AssetId,
        #[arg(long)]
        value: Amount,
    },
    /// Print the escrowed custody balance (operator only).
    Balance {
        #[arg(long = "as")]
        caller: HolderId,
    },
    /// Move the entire custody balance to the operator's cash account.
    Withdraw {
        #[arg(long = "as")]
        caller: HolderId,
    },
    /// Print the event log.
    Events,
    /// Print a digest-bearing snapshot of the whole state.
    Snapshot,
}

#[derive(Serialize, Deserialize)]
struct StateFile {
    gallery: Gallery,
    registry: TokenRegistry,
    cash: CashAccounts,
}

fn fail(err: impl Display) -> ! {
    eprintln!("error: {err}");
    process::exit(2);
}

fn load_state(path: &Path) -> StateFile {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => fail(format_args!(
            "no state file at {} (run `art-gallery init` first)",
            path.display()
        )),
    };
    match serde_json::from_slice(&bytes) {
        Ok(state) => state,
        Err(err) => fail(format_args!("malformed state file: {err}")),
    }
}

fn save_state(path: &Path, state: &StateFile) {
    let json = match serde_json::to_vec_pretty(state) {
        Ok(json) => json,
        Err(err) => fail(err),
    };
    if let Err(err) = fs::write(path, json) {
        fail(format_args!("cannot write {}: {err}", path.display()));
    }
}

fn main() {
    let cli = Cli::parse();

    if let Command::Init { operator } = &cli.command {
        if cli.state.exists() {
            fail(format_args!("{} already exists", cli.state.display()));
        }
        let state = StateFile {
            gallery: Gallery::new(operator.clone()),
            registry: TokenRegistry::new(),
            cash: CashAccounts::new(),
        };
        save_state(&cli.state, &state);
        println!(
            "initialized gallery for operator {operator} → {}",
            cli.state.display()
        );
        return;
    }

    let mut state = load_state(&cli.state);
    match cli.command {
        Command::Init { .. } => unreachable!("handled above"),
        Command::Mint {
            caller,
            id,
            uri,
            price,
            holder,
        } => {
            let result = match &holder {
                Some(holder) => state.gallery.mint_to_holder(
                    &caller,
                    &mut state.registry,
                    &uri,
                    id,
                    holder,
                    price,
                ),
                None => state
                    .gallery
                    .mint_to_self(&caller, &mut state.registry, &uri, id, price),
            };
            if let Err(err) = result {
                fail(err);
            }
            let held_by = holder.unwrap_or_else(|| state.gallery.operator().clone());
            save_state(&cli.state, &state);
            println!("minted asset {id} to {held_by} at price {price}");
        }
        Command::SetPrice { caller, id, price } => {
            if let Err(err) = state.gallery.set_price(&caller, &state.registry, id, price) {
                fail(err);
            }
            save_state(&cli.state, &state);
            println!("asset {id} now priced at {price}");
        }
        Command::Price { id } => {
            println!("{}", state.gallery.price_of(id));
        }
        Command::Owner { id } => match state.registry.owner_of(id) {
            Ok(holder) => println!("{holder}"),
            Err(err) => fail(err),
        },
        Command::Holdings { holder } => {
            let assets = state.registry.assets_of(&holder);
            println!("{holder} holds {} asset(s)", assets.len());
            for id in assets {
                let price = state.gallery.price_of(id);
                let uri = state.gallery.uri_of(id).unwrap_or("-");
                println!("  {id}  price={price}  uri={uri}");
            }
        }
        Command::Buy { caller, id, value } => {
            if let Err(err) = state.gallery.buy(&caller, &mut state.registry, id, value) {
                fail(err);
            }
            save_state(&cli.state, &state);
            println!("asset {id} sold to {caller} for {value}");
        }
        Command::Balance { caller } => match state.gallery.contract_balance(&caller) {
            Ok(balance) => println!("{balance}"),
            Err(err) => fail(err),
        },
        Command::Withdraw { caller } => match state.gallery.withdraw(&caller, &mut state.cash) {
            Ok(amount) => {
                save_state(&cli.state, &state);
                println!(
                    "withdrew {amount} to {} (now holding {})",
                    state.gallery.operator(),
                    state.cash.available(state.gallery.operator())
                );
            }
            Err(err) => fail(err),
        },
        Command::Events => match serde_json::to_string_pretty(state.gallery.events()) {
            Ok(json) => println!("{json}"),
            Err(err) => fail(err),
        },
        Command::Snapshot => {
            let snapshot = state.gallery.snapshot(state.registry.holdings());
            println!("operator: {}", snapshot.operator);
            println!("assets:   {}", snapshot.holdings.len());
            println!("listed:   {}", snapshot.prices.len());
            println!("custody:  {}", snapshot.custody);
            println!("events:   {}", snapshot.events);
            println!("digest:   {}", hex::encode(snapshot.digest));
        }
    }
}
