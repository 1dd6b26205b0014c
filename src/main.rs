#[macro_use] extern crate rocket;

use log::info;
use rocket_dyn_templates::{Template, handlebars};
use rocket_dyn_templates::handlebars::{Handlebars, Helper};
use crate::db::StoreFairing;
use crate::notify::{Notifier, NotifyConfig};
use crate::walltime::to_12_hour;

mod borrow;
mod classes;
mod conflicts;
mod dashboard;
mod db;
mod lifecycle;
mod notify;
mod record;
mod reservation;
mod schedule;
mod store;
mod studio;
mod util;
mod walltime;

#[launch]
fn rocket() -> _ {
    let rocket = rocket::build()
        .attach(Template::custom(|engines| {
            let handlebars = &mut engines.handlebars;

            handlebars.register_helper("time12",
                                       Box::new(|h: &Helper, _r: &Handlebars, _: &handlebars::Context, _rc: &mut handlebars::RenderContext, out: &mut dyn handlebars::Output| -> handlebars::HelperResult {
                                           let val = h.param(0).ok_or(handlebars::RenderErrorReason::ParamNotFoundForIndex("time12", 0))?.value();
                                           let s = val.as_str().map(to_12_hour).unwrap_or_else(|| "--:--".to_string());
                                           out.write(&s)?;
                                           Ok(())
                                       }));
        }))
        .attach(StoreFairing());
    let rocket = store::extend(rocket);
    let rocket = reservation::extend(rocket);
    let rocket = classes::extend(rocket);
    let rocket = borrow::extend(rocket);
    let rocket = schedule::extend(rocket);
    let rocket = studio::extend(rocket);
    let rocket = dashboard::extend(rocket);

    let notifier = if cfg!(test) {
        Notifier::disabled()
    } else {
        let notify_cfg = rocket.figment().extract_inner::<NotifyConfig>("notify")
            .unwrap_or_else(|e| {
                info!("No notification endpoints configured: {e}");
                NotifyConfig::default()
            });
        Notifier::new(notify_cfg)
    };

    rocket.manage(notifier)
}
