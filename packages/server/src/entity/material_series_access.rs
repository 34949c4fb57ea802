use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "material_series_access")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub material_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub series_id: i32,
    #[sea_orm(belongs_to, from = "material_id", to = "id")]
    pub material: HasOne<super::material::Entity>,
    #[sea_orm(belongs_to, from = "series_id", to = "id")]
    pub series: HasOne<super::series::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
