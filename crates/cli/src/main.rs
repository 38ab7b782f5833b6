//! Clementine CLI - Shopping session shell.
//!
//! # Usage
//!
//! ```bash
//! # Log in (password read from CLEMENTINE_PASSWORD or prompted)
//! clementine auth login -u alice
//!
//! # Show who is logged in
//! clementine auth whoami
//!
//! # Cart operations
//! clementine cart show
//! clementine cart add p-42 --quantity 2
//! clementine cart remove p-42
//! clementine cart coupon WELCOME10
//! clementine order place
//!
//! # Wishlist operations
//! clementine wishlist show
//! clementine wishlist add p-42
//! ```
//!
//! # Commands
//!
//! - `auth` - Login, logout, registration, session inspection
//! - `cart` - Cart display and mutation
//! - `wishlist` - Wishlist display and mutation
//! - `order` - Order placement

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "clementine")]
#[command(author, version, about = "Clementine shopping client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the login session
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Inspect and change the shopping cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Inspect and change the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Place orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Log in with a username and password
    Login {
        /// Account username
        #[arg(short, long)]
        username: String,
    },
    /// Register a new account and log into it
    Register {
        /// Account username
        #[arg(short, long)]
        username: String,
    },
    /// Destroy the current session
    Logout,
    /// Show the current session
    Whoami,
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart after syncing with the backend
    Show,
    /// Add a product to the cart
    Add {
        /// Product id (e.g. `p-42`)
        product_id: String,

        /// Number of units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a product from the cart
    Remove {
        /// Product id
        product_id: String,
    },
    /// Set a product's quantity (0 removes it)
    Update {
        /// Product id
        product_id: String,

        /// New quantity
        quantity: u32,
    },
    /// Apply a coupon code
    Coupon {
        /// Coupon code
        code: String,
    },
    /// Empty the local cart without a server round trip
    Clear,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Show the wishlist after syncing with the backend
    Show,
    /// Add a product to the wishlist
    Add {
        /// Product id
        product_id: String,
    },
    /// Remove a product from the wishlist
    Remove {
        /// Product id
        product_id: String,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Place an order for the current cart
    Place,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let state = commands::build_state()?;

    match cli.command {
        Commands::Auth { action } => match action {
            AuthAction::Login { username } => commands::auth::login(&state, &username).await?,
            AuthAction::Register { username } => {
                commands::auth::register(&state, &username).await?;
            }
            AuthAction::Logout => commands::auth::logout(&state),
            AuthAction::Whoami => commands::auth::whoami(&state),
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&state).await,
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(&state, &product_id, quantity).await?,
            CartAction::Remove { product_id } => {
                commands::cart::remove(&state, &product_id).await?;
            }
            CartAction::Update {
                product_id,
                quantity,
            } => commands::cart::update(&state, &product_id, quantity).await?,
            CartAction::Coupon { code } => commands::cart::coupon(&state, &code).await?,
            CartAction::Clear => commands::cart::clear(&state),
        },
        Commands::Wishlist { action } => match action {
            WishlistAction::Show => commands::wishlist::show(&state).await,
            WishlistAction::Add { product_id } => {
                commands::wishlist::add(&state, &product_id).await?;
            }
            WishlistAction::Remove { product_id } => {
                commands::wishlist::remove(&state, &product_id).await;
            }
        },
        Commands::Order { action } => match action {
            OrderAction::Place => commands::cart::place_order(&state).await?,
        },
    }
    Ok(())
}
