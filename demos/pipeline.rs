//! Producer/consumer pipeline demo for Lockstep.
//!
//! A producer emits one item per logical tick into a shared cell; a
//! consumer, sensitized to the cell, folds every item into a running
//! total. The pair communicates through nothing but channel fields, and
//! the handshake (`seq` strictly increases) shows that no update is ever
//! lost or observed twice.
//!
//! The consumer is spawned, so it outranks the producer: at each commit
//! both wake, the consumer folds the item first, and the producer then
//! schedules the next one. When the producer finishes, the consumer has
//! already posted its result in the same instant.
//!
//! # Running
//!
//! ```bash
//! cargo run --example pipeline
//! ```

use lockstep::cx::Cx;
use lockstep::record;
use lockstep::runtime::Runtime;
use lockstep::types::{Duration, Key, Value};

const ITEMS: i64 = 8;

fn main() {
    let rt = Runtime::new();
    let (end, returns) = rt
        .start(|cx: Cx| async move {
            let cell = cx.channel(record! {
                "seq" => Value::Int(0),
                "item" => Value::Int(0),
            });

            let consumer = cx
                .spawn(move |c| async move {
                    let mut total = 0i64;
                    let mut last_seq = 0i64;
                    loop {
                        c.wait_one(cell).await;
                        let seq = c.get(cell, &"seq".into()).unwrap().as_int().unwrap();
                        let item = c.get(cell, &"item".into()).unwrap().as_int().unwrap();
                        assert_eq!(seq, last_seq + 1, "no item is lost or repeated");
                        last_seq = seq;
                        total += item;
                        println!(
                            "[{}] consumed item {item} (seq {seq}), total {total}",
                            c.now()
                        );
                        if seq == ITEMS {
                            return vec![Value::Int(total)];
                        }
                    }
                })
                .await;

            for seq in 1..=ITEMS {
                cx.after(Duration::from_ticks(1), cell, "seq".into(), Value::Int(seq))
                    .unwrap();
                cx.after(
                    Duration::from_ticks(1),
                    cell,
                    "item".into(),
                    Value::Int(seq * seq),
                )
                .unwrap();
                cx.wait_one(cell).await;
                println!("[{}] produced item {} (seq {seq})", cx.now(), seq * seq);
            }

            // The consumer outranks this process, so by now it has folded
            // the final item and terminated.
            assert_eq!(cx.get(consumer, &Key::terminated()), Some(Value::Bool(true)));
            vec![cx.get(consumer, &Key::Index(0)).unwrap()]
        })
        .expect("the demo program is well-formed");

    println!("finished at {end}: total {:?}", returns[0]);
}
