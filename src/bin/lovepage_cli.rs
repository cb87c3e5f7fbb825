use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use lovepage_api::{
    config::{self, AppConfig},
    db,
    entities::{CouponModel, DiscountType, PlanModel},
    errors::ServiceError,
    repositories::{NewCoupon, NewPlan},
    services::{
        coupons::{DiscountSource, ResolutionOutcome, ResolvedDiscount},
        factory::ServiceFactory,
        payments::StripeClient,
        promotions::{ExternalPromotion, PromotionLookup},
    },
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::Plans(command) => handle_plans_command(&context, command, cli.json).await?,
        Commands::Coupons(command) => handle_coupons_command(&context, command, cli.json).await?,
        Commands::Quote(args) => handle_quote(&context, args, cli.json).await?,
        Commands::Checkout(args) => handle_checkout(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "lovepage", about = "LovePage CLI for plans, coupons and checkout", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    #[command(subcommand)]
    Plans(PlansCommands),
    #[command(subcommand)]
    Coupons(CouponsCommands),
    /// Price a plan with an optional discount code
    Quote(QuoteArgs),
    /// Open a hosted checkout session with the payment provider
    Checkout(CheckoutArgs),
}

#[derive(Subcommand)]
enum PlansCommands {
    Create(CreatePlanArgs),
    List,
}

#[derive(Args)]
struct CreatePlanArgs {
    #[arg(long, help = "Display name of the plan")]
    name: String,
    #[arg(long, help = "Optional description")]
    description: Option<String>,
    #[arg(long, help = "Price in minor currency units (e.g. 1990 for 19.90)")]
    price_cents: i64,
}

#[derive(Subcommand)]
enum CouponsCommands {
    Create(CreateCouponArgs),
    /// Resolve a code against a price without touching usage counters
    Check(CheckCouponArgs),
    /// Count one use of a coupon
    Redeem(RedeemCouponArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum DiscountKind {
    Percentage,
    FixedAmount,
}

impl From<DiscountKind> for DiscountType {
    fn from(kind: DiscountKind) -> Self {
        match kind {
            DiscountKind::Percentage => DiscountType::Percentage,
            DiscountKind::FixedAmount => DiscountType::FixedAmount,
        }
    }
}

#[derive(Args)]
struct CreateCouponArgs {
    #[arg(long, help = "Coupon code; stored upper-case")]
    code: String,
    #[arg(long = "type", value_enum, help = "Discount kind")]
    discount_type: DiscountKind,
    #[arg(long, help = "Percentage, or amount in major currency units")]
    value: Decimal,
    #[arg(long, help = "Maximum number of redemptions")]
    limit: Option<i32>,
    #[arg(long, help = "First valid day (YYYY-MM-DD)")]
    start: Option<NaiveDate>,
    #[arg(long, help = "Last valid day (YYYY-MM-DD)")]
    end: Option<NaiveDate>,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Referral partner (UUID)")]
    partner: Option<Uuid>,
    #[arg(long, action = ArgAction::SetTrue, help = "Create the coupon disabled")]
    inactive: bool,
}

#[derive(Args)]
struct CheckCouponArgs {
    #[arg(long, help = "Code to resolve")]
    code: String,
    #[arg(long, help = "Base price in minor currency units")]
    amount: i64,
}

#[derive(Args)]
struct RedeemCouponArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Coupon identifier (UUID)")]
    id: Uuid,
}

#[derive(Args)]
struct QuoteArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Plan identifier (UUID)")]
    plan: Uuid,
    #[arg(long, help = "Optional discount code")]
    code: Option<String>,
}

#[derive(Args)]
struct CheckoutArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Plan identifier (UUID)")]
    plan: Uuid,
    #[arg(long, help = "Optional discount code")]
    code: Option<String>,
    #[arg(long, help = "Customer email to prefill on the checkout page")]
    email: Option<String>,
}

struct CliContext {
    factory: ServiceFactory,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;

        Ok(Self {
            factory: ServiceFactory::new(Arc::new(db_pool), config),
        })
    }

    fn config(&self) -> &AppConfig {
        self.factory.config()
    }

    /// Provider lookup when a secret is configured; otherwise every deferral
    /// fails as unavailable.
    fn promotion_lookup(&self) -> Result<Arc<dyn PromotionLookup>> {
        if self.config().payment_provider_secret_key.is_some() {
            let client = StripeClient::from_config(self.config())
                .context("failed to build payment provider client")?;
            Ok(Arc::new(client))
        } else {
            Ok(Arc::new(UnconfiguredProvider))
        }
    }
}

struct UnconfiguredProvider;

#[async_trait]
impl PromotionLookup for UnconfiguredProvider {
    async fn find_active_promotion(
        &self,
        _code: &str,
    ) -> Result<Option<ExternalPromotion>, ServiceError> {
        Err(ServiceError::ServiceUnavailable(
            "payment provider is not configured".to_string(),
        ))
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    db::run_migrations(context.factory.db_pool())
        .await
        .context("failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

async fn handle_plans_command(
    context: &CliContext,
    command: PlansCommands,
    json: bool,
) -> Result<()> {
    let plans = context.factory.plan_repository();

    match command {
        PlansCommands::Create(args) => {
            let plan = plans
                .create(NewPlan {
                    name: args.name,
                    description: args.description,
                    price_cents: args.price_cents,
                })
                .await
                .context("failed to create plan")?;

            if json {
                print_json(&plan)?;
            } else {
                println!("Created plan:");
                render_plan(&plan);
            }
        }
        PlansCommands::List => {
            let active = plans.list_active().await.context("failed to list plans")?;

            if json {
                print_json(&active)?;
            } else if active.is_empty() {
                println!("No active plans");
            } else {
                for plan in &active {
                    render_plan(plan);
                }
            }
        }
    }

    Ok(())
}

async fn handle_coupons_command(
    context: &CliContext,
    command: CouponsCommands,
    json: bool,
) -> Result<()> {
    let coupons = context.factory.coupon_repository();

    match command {
        CouponsCommands::Create(args) => {
            let coupon = coupons
                .create(NewCoupon {
                    code: args.code,
                    discount_type: args.discount_type.into(),
                    discount_value: args.value,
                    usage_limit: args.limit,
                    start_date: args.start,
                    end_date: args.end,
                    active: !args.inactive,
                    partner_id: args.partner,
                })
                .await
                .context("failed to create coupon")?;

            if json {
                print_json(&coupon)?;
            } else {
                println!("Created coupon:");
                render_coupon(&coupon);
            }
        }
        CouponsCommands::Check(args) => {
            let outcome = context
                .factory
                .coupon_resolver()
                .resolve(&args.code, args.amount, Utc::now())
                .await
                .context("failed to resolve coupon")?;

            let view = outcome_json(&outcome);
            if json {
                print_json(&view)?;
            } else {
                render_outcome(&outcome);
            }
        }
        CouponsCommands::Redeem(args) => {
            let redeemed = coupons
                .record_redemption(args.id)
                .await
                .context("failed to record redemption")?;

            if json {
                print_json(&json!({ "coupon_id": args.id, "redeemed": redeemed }))?;
            } else if redeemed {
                println!("Redemption recorded for coupon {}", args.id);
            }
            ensure_redeemed(args.id, redeemed)?;
        }
    }

    Ok(())
}

async fn handle_quote(context: &CliContext, args: QuoteArgs, json: bool) -> Result<()> {
    let plan = context
        .factory
        .plan_repository()
        .find_active(args.plan)
        .await
        .context("failed to load plan")?
        .ok_or_else(|| anyhow!("plan {} not found", args.plan))?;

    let composer = context.factory.price_composer(context.promotion_lookup()?);
    let quote = composer
        .compose(plan.price_cents, args.code.as_deref(), Utc::now())
        .await
        .context("checkout rejected")?;

    if json {
        print_json(&json!({
            "plan_id": plan.id,
            "quote": quote.quote,
            "discount": quote.discount.as_ref().map(discount_json),
            "metadata": quote.metadata,
        }))?;
    } else {
        println!(
            "{}: base {} - discount {} = {}",
            plan.name,
            quote.quote.base_amount,
            quote.quote.discount_amount,
            quote.quote.final_amount
        );
        if let Some(reference) = quote.promotion_reference() {
            println!("Provider promotion {} applies at checkout", reference);
        }
    }

    Ok(())
}

async fn handle_checkout(context: &CliContext, args: CheckoutArgs, json: bool) -> Result<()> {
    let service = context
        .factory
        .provider_checkout_service()
        .context("payment provider is not configured")?;

    let session = service
        .start_checkout(args.plan, args.code.as_deref(), args.email)
        .await
        .context("failed to start checkout")?;

    if json {
        print_json(&session)?;
    } else {
        println!("Checkout session {}", session.id);
        if let Some(url) = &session.url {
            println!("Pay at: {}", url);
        }
    }

    Ok(())
}

/// A refused redemption fails the command in every output mode.
fn ensure_redeemed(coupon_id: Uuid, redeemed: bool) -> Result<()> {
    if redeemed {
        Ok(())
    } else {
        Err(anyhow!(
            "coupon {} is unknown, inactive or exhausted",
            coupon_id
        ))
    }
}

fn discount_json(discount: &ResolvedDiscount) -> serde_json::Value {
    match &discount.source {
        DiscountSource::Local {
            coupon_id,
            discount_type,
            discount_value,
        } => json!({
            "source": "local",
            "code": discount.code,
            "coupon_id": coupon_id,
            "discount_type": discount_type.as_str(),
            "discount_value": discount_value,
            "discount_cents": discount.discount_cents,
        }),
        DiscountSource::External { promotion_id } => json!({
            "source": "external",
            "code": discount.code,
            "promotion_id": promotion_id,
        }),
    }
}

fn outcome_json(outcome: &ResolutionOutcome) -> serde_json::Value {
    match outcome {
        ResolutionOutcome::NoCodeProvided => json!({ "outcome": "no_code_provided" }),
        ResolutionOutcome::Rejected(reasons) => json!({
            "outcome": "rejected",
            "reasons": reasons.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
        }),
        ResolutionOutcome::Accepted(discount) => json!({
            "outcome": "accepted",
            "discount": discount_json(discount),
        }),
        ResolutionOutcome::DeferToExternal(code) => json!({
            "outcome": "defer_to_external",
            "code": code,
        }),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_plan(plan: &PlanModel) {
    println!(
        "- Plan {} • {} • {} cents",
        plan.id, plan.name, plan.price_cents
    );
}

fn render_coupon(coupon: &CouponModel) {
    let limit = coupon
        .usage_limit
        .map(|l| l.to_string())
        .unwrap_or_else(|| "unlimited".to_string());
    println!(
        "- Coupon {} • {} • {} {} • used {}/{} • {}",
        coupon.id,
        coupon.code,
        coupon.discount_type.as_str(),
        coupon.discount_value,
        coupon.used_count,
        limit,
        if coupon.active { "active" } else { "inactive" }
    );
}

fn render_outcome(outcome: &ResolutionOutcome) {
    match outcome {
        ResolutionOutcome::NoCodeProvided => println!("No code provided"),
        ResolutionOutcome::Rejected(reasons) => {
            let labels: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
            println!("Rejected: {}", labels.join(", "));
        }
        ResolutionOutcome::Accepted(discount) => println!(
            "Accepted {}: {} cents off",
            discount.code, discount.discount_cents
        ),
        ResolutionOutcome::DeferToExternal(code) => {
            println!("{} is not a local coupon; the payment provider decides", code)
        }
    }
}
