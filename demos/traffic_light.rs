//! Traffic light demo for Lockstep.
//!
//! A controller process cycles a light through green, yellow, and red with
//! different dwell times, while a passive observer process reports every
//! transition. The observer is deferred, which places it below the
//! controller in the priority order: each instant write to the light wakes
//! it within the same instant. It is also passive, so it never keeps the
//! runtime alive: once the controller finishes its cycles, the run ends.
//!
//! Everything here is deterministic. Run it twice and the transcript is
//! identical, down to the interleaving of the two processes.
//!
//! # Running
//!
//! ```bash
//! cargo run --example traffic_light
//! ```

use lockstep::cx::Cx;
use lockstep::record;
use lockstep::runtime::Runtime;
use lockstep::types::{Duration, Value};

const PHASES: [(&str, u64); 3] = [("green", 5), ("yellow", 2), ("red", 4)];

fn report(c: &Cx, light: lockstep::ChannelId) {
    let color = c
        .get(light, &"color".into())
        .and_then(|v| v.as_text().map(String::from))
        .unwrap_or_default();
    println!("[{}] light is {color}", c.now());
}

fn main() {
    let rt = Runtime::new();
    let (end, returns) = rt
        .start(|cx: Cx| async move {
            let light = cx.channel(record! { "color" => Value::Text("off".into()) });

            // Launches at the controller's first suspension, below it in
            // priority, so every later instant write wakes it.
            cx.defer(move |c| async move {
                c.set_passive();
                report(&c, light);
                loop {
                    c.wait_one(light).await;
                    report(&c, light);
                }
            });

            let tick = cx.channel(record! {});
            let mut transitions = 0i64;
            for cycle in 0..2 {
                for (color, dwell) in PHASES {
                    cx.set(light, "color".into(), Value::Text(color.into()));
                    transitions += 1;
                    println!("[{}] cycle {cycle}: switched to {color}", cx.now());
                    cx.after(
                        Duration::from_ticks(dwell),
                        tick,
                        "t".into(),
                        Value::Time(cx.now()),
                    )
                    .expect("dwell times are positive");
                    cx.wait_one(tick).await;
                }
            }
            vec![Value::Int(transitions)]
        })
        .expect("the demo program is well-formed");

    println!("finished at {end} after {:?} transitions", returns[0]);
}
