use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use crate::config::ThresholdConfig;
use crate::models::{Decision, Notification, PriceReading, ScrapeOutcome};

pub const ADMIN_ALERT_SUBJECT: &str = "Something went wrong retrieving price data";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maps one scrape outcome to at most one message. No I/O, no clock reads.
pub fn decide(outcome: &ScrapeOutcome, config: &ThresholdConfig, generated_at: NaiveDateTime) -> Decision {
    let (fuel, co2) = match outcome {
        ScrapeOutcome::Success(PriceReading::Valid { fuel_price, co2_price }) => (*fuel_price, *co2_price),
        ScrapeOutcome::Success(PriceReading::Unparsed { raw_fuel, raw_co2 }) => {
            let detail = format!(
                "Prices were extracted but could not be parsed.\nRaw fuel text: {:?}\nRaw co2 text: {:?}",
                raw_fuel, raw_co2
            );
            return admin_alert(config, &detail, generated_at);
        }
        ScrapeOutcome::LoginFailed => {
            return admin_alert(config, "Login failed after exhausting all attempts.", generated_at);
        }
        ScrapeOutcome::ExtractionFailed(cause) => {
            let detail = format!("Price extraction failed: {}", cause);
            return admin_alert(config, &detail, generated_at);
        }
    };

    let fuel_hit = config.direction.is_hit(fuel, config.fuel_threshold);
    let co2_hit = config.direction.is_hit(co2, config.co2_threshold);

    let subject = match (fuel_hit, co2_hit) {
        (true, true) => format!("Fuel: {}; Co2: {}", fuel, co2),
        (true, false) => format!("Fuel: {}", fuel),
        (false, true) => format!("Co2: {}", co2),
        (false, false) => return Decision::NoAction,
    };

    Decision::Notify(Notification {
        subject,
        body: price_body(fuel, co2, generated_at),
        recipients: config.recipients.iter().cloned().collect(),
    })
}

fn price_body(fuel: u32, co2: u32, generated_at: NaiveDateTime) -> String {
    format!(
        "Fuel price = {}\nCo2 price = {}\nGenerated at {}\n\nThis message was sent by an automated price watcher.\n",
        fuel,
        co2,
        generated_at.format(TIMESTAMP_FORMAT)
    )
}

fn admin_alert(config: &ThresholdConfig, detail: &str, generated_at: NaiveDateTime) -> Decision {
    Decision::AdminAlert(Notification {
        subject: ADMIN_ALERT_SUBJECT.to_string(),
        body: format!("{}\nGenerated at {}\n", detail, generated_at.format(TIMESTAMP_FORMAT)),
        recipients: BTreeSet::from([config.admin_address.clone()]),
    })
}
