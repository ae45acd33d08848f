#[rocket::launch]
fn launch() -> _ {
    let rocket = points_api::rocket();
    log::info!("Starting Points API Server");
    rocket
}
