//! Host-side emulation of the Acorn Archimedes keyboard/mouse link.
//!
//! [`machine::archie::ArchieKeyboard`] speaks the keyboard's half of the
//! serial protocol to the computer's keyboard controller over any
//! [`machine::generic::link::Transport`].

pub mod machine;
