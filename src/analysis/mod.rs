pub mod rmsd;
