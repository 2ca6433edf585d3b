pub mod mopac;
