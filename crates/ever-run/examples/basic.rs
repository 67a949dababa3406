use ever_run::{EverRun, StepError, Workflow, WorkflowContext};
use serde_json::{json, Value};

struct OrderWorkflow;

#[ever_run::async_trait]
impl Workflow for OrderWorkflow {
  fn name(&self) -> &'static str {
    "order"
  }

  async fn run(&self, ctx: WorkflowContext, input: Value) -> ever_run::Result<Value> {
    // Reserve inventory
    let reserved = ctx
      .step("reserve", input.clone(), |input| async move {
        Ok(json!({ "reserved": input["items"] }))
      })
      .await?;

    // Charge the customer
    let charged = ctx
      .step("charge", input, |input| async move {
        let amount = input["amount"].as_u64().unwrap_or(0);
        if amount == 0 {
          return Err(StepError::fatal("nothing to charge"));
        }

        Ok(json!({ "charged": amount }))
      })
      .await?;

    Ok(json!({ "reserved": reserved, "charged": charged }))
  }
}

#[tokio::main]
async fn main() {
  ever_run_logger::init_logger();

  // Create the engine
  let engine = EverRun::builder().workflow(OrderWorkflow).build();

  // Start a run
  let run_id = engine
    .submit("order", json!({ "items": ["book"], "amount": 12 }))
    .await
    .unwrap();

  // Await the outcome
  let snapshot = engine.wait(&run_id).await.unwrap();

  println!("{:?}: {:?}", snapshot.status, snapshot.output);
}
