//! Demo of synchronous and asynchronous executions, happy and unhappy paths.
//!
//! Run with: cargo run --example demo

use std::time::Duration;

use cadence::{Action, ActionError, Execution, Pending, Phases};
use futures_util::FutureExt;

// ============================================================================
// Actions
// ============================================================================

/// Apply a discount code to a cart. Synchronous.
#[derive(Debug, Clone)]
struct ApplyDiscount {
    code: String,
    percent: u8,
}

impl Action for ApplyDiscount {
    fn validate(&self) -> Vec<ActionError> {
        let mut errors = Vec::new();
        if self.code.is_empty() {
            errors.push(ActionError::user("A discount code is required"));
        }
        if self.percent > 50 {
            errors.push(ActionError::other(format!(
                "Discount of {}% exceeds the limit",
                self.percent
            )));
        }
        errors
    }
}

/// Charge a card. Asynchronous.
#[derive(Debug, Clone)]
struct ChargeCard {
    customer: String,
    cents: u64,
}

impl Action for ChargeCard {
    const IS_SYNC: bool = false;
}

// ============================================================================
// Hooks
// ============================================================================

struct DiscountHooks;

impl Phases<ApplyDiscount> for DiscountHooks {
    type Output = u8;

    fn on_will(&self, execution: &Execution<ApplyDiscount, Self>) -> Result<(), ActionError> {
        let action = execution.action();
        println!("  [ApplyDiscount] Will apply {} ({}%)", action.code, action.percent);
        if action.code == "EXPIRED" {
            execution.reject("This discount code has expired")?;
        }
        Ok(())
    }

    fn on_do(
        &self,
        execution: &Execution<ApplyDiscount, Self>,
    ) -> Result<Option<Pending>, ActionError> {
        execution.done(execution.action().percent)?;
        Ok(None)
    }

    fn on_finally(&self, execution: &Execution<ApplyDiscount, Self>) -> Result<(), ActionError> {
        println!("  [ApplyDiscount] Finished as {}", execution.state());
        Ok(())
    }
}

struct ChargeHooks {
    decline: bool,
}

impl Phases<ChargeCard> for ChargeHooks {
    type Output = String;

    fn on_do(&self, execution: &Execution<ChargeCard, Self>) -> Result<Option<Pending>, ActionError> {
        let execution = execution.clone();
        let decline = self.decline;

        Ok(Some(
            async move {
                let action = execution.action();
                println!(
                    "  [ChargeCard] Charging {} cents to {}...",
                    action.cents, action.customer
                );
                tokio::time::sleep(Duration::from_millis(100)).await;

                if decline {
                    return Err(ActionError::other("Card declined by issuer"));
                }
                execution.done(format!("PAY-{}-{}", action.customer, action.cents))?;
                Ok::<(), ActionError>(())
            }
            .boxed(),
        ))
    }

    fn on_finally(&self, execution: &Execution<ChargeCard, Self>) -> Result<(), ActionError> {
        println!("  [ChargeCard] Finished as {}", execution.state());
        Ok(())
    }
}

// ============================================================================
// Demo
// ============================================================================

fn print_header(title: &str) {
    println!();
    println!("{}", "=".repeat(60));
    println!("  {}", title);
    println!("{}", "=".repeat(60));
}

fn discount(code: &str, percent: u8) -> Execution<ApplyDiscount, DiscountHooks> {
    Execution::new(
        ApplyDiscount {
            code: code.to_owned(),
            percent,
        },
        DiscountHooks,
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    print_header("SCENARIO 1: Discount applied (sync, happy path)");
    let exec = discount("SPRING", 20).execute()?;
    println!("  Result: {:?}", exec.result());

    print_header("SCENARIO 2: Expired code (sync, canceled in will)");
    let exec = discount("EXPIRED", 10).execute()?;
    println!("  Canceled: {} ({:?})", exec.is_canceled(), exec.error().map(|e| e.to_string()));

    print_header("SCENARIO 3: Discount too large (sync, validation failure)");
    let exec = discount("VIP", 90).execute()?;
    println!("  Failed: {} ({:?})", exec.is_failed(), exec.error().map(|e| e.to_string()));

    print_header("SCENARIO 4: Inspect before committing");
    let exec = discount("SUMMER", 15);
    exec.execute_will()?;
    println!("  Parked in state '{}'", exec.state());
    exec.execute()?;
    println!("  Result: {:?}", exec.result());

    print_header("SCENARIO 5: Card charged (async, happy path)");
    let exec = Execution::new(
        ChargeCard {
            customer: "alice".into(),
            cents: 4_999,
        },
        ChargeHooks { decline: false },
    );
    match exec.execute()?.future().await {
        Ok(payment) => println!("  Payment: {:?}", payment),
        Err(e) => println!("  Error: {}", e),
    }

    print_header("SCENARIO 6: Card declined (async, failure)");
    let exec = Execution::new(
        ChargeCard {
            customer: "bob".into(),
            cents: 120,
        },
        ChargeHooks { decline: true },
    );
    match exec.execute()?.future().await {
        Ok(payment) => println!("  Payment: {:?}", payment),
        Err(e) => println!("  Error: {} (failed: {})", e, exec.is_failed()),
    }

    print_header("SCENARIO 7: Customer cancels mid-charge (async)");
    let exec = Execution::new(
        ChargeCard {
            customer: "carol".into(),
            cents: 800,
        },
        ChargeHooks { decline: false },
    );
    let future = exec.execute()?.future();
    tokio::time::sleep(Duration::from_millis(20)).await;
    exec.reject("Customer closed the checkout")?;
    match future.await {
        Ok(payment) => println!("  Payment: {:?}", payment),
        Err(e) => println!("  Canceled: {} ({})", exec.is_canceled(), e),
    }
    println!("  Snapshot: {}", serde_json::to_string(&exec.snapshot())?);

    Ok(())
}
