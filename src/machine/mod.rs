pub mod archie;
pub mod generic;
