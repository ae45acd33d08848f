use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("points_db")]
pub struct PointsDb(sqlx::PgPool);
