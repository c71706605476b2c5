pub mod albums;
pub mod photos;
pub mod users;

pub mod prelude {
    pub use super::albums::Entity as Albums;
    pub use super::photos::Entity as Photos;
    pub use super::users::Entity as Users;
}
