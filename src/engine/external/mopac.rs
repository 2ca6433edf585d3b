use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use nalgebra::Point3;
use regex::Regex;

use crate::core::molecule::Molecule;
use crate::engine::evaluator::{EvalError, EvaluationResult, Evaluator};

/// kcal/mol to kJ/mol.
pub const KCAL_TO_KJ: f64 = 4.184;

const SCF_MARKER: &str = "SCF FIELD WAS ACHIEVED";

// Compiled once per process.
fn heat_of_formation_re() -> Result<&'static Regex, EvalError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"FINAL HEAT OF FORMATION\s*=\s*([-+]?\d+(?:\.\d*)?(?:[eE][-+]?\d+)?)"))
        .as_ref()
        .map_err(|e| EvalError::Parse(e.to_string()))
}

/// File-based wrapper for the MOPAC semi-empirical package.
///
/// Each evaluation writes `<jobname>.mop` into the work directory, runs
/// `<executable> <jobname>.mop` there and reads back `<jobname>.out`.
/// Energies are heats of formation converted to kJ/mol.
pub struct MopacEvaluator {
    executable: String,
    keywords: String,
    jobname: String,
    work_dir: PathBuf,
    optimize: bool,
}

impl MopacEvaluator {
    pub const DEFAULT_KEYWORDS: &'static str = "PM6-D GEO-OK PRECISE";

    /// Creates a new evaluator.
    ///
    /// # Arguments
    /// * `executable` - MOPAC binary (e.g., "MOPAC2016.exe").
    /// * `keywords` - First line of the input deck.
    /// * `work_dir` - Directory for the scratch files.
    pub fn new(executable: &str, keywords: &str, work_dir: impl AsRef<Path>) -> Self {
        Self {
            executable: executable.to_string(),
            keywords: keywords.trim().to_string(),
            jobname: "gamss".to_string(),
            work_dir: work_dir.as_ref().to_path_buf(),
            optimize: true,
        }
    }

    /// Freeze all Cartesian coordinates (single-point energies).
    pub fn single_point(mut self) -> Self {
        self.optimize = false;
        self
    }

    /// Builds the `.mop` input deck.
    pub fn generate_input(&self, molecule: &Molecule) -> String {
        let flag = if self.optimize { 1 } else { 0 };
        let mut s = String::with_capacity(64 * (molecule.num_atoms() + 3));

        let _ = writeln!(s, "{}", self.keywords);
        let _ = writeln!(s, "{}", molecule.title());
        s.push('\n');
        for (atom, p) in molecule.atoms().iter().zip(molecule.coordinates()) {
            let _ = writeln!(
                s,
                "{:<3}\t{:>10.6} {} {:>10.6} {} {:>10.6} {}",
                atom.symbol, p.x, flag, p.y, flag, p.z, flag
            );
        }
        s
    }

    fn run_process(&self, input: &str) -> Result<String, EvalError> {
        fs::create_dir_all(&self.work_dir)?;
        let deck = format!("{}.mop", self.jobname);
        let out = self.work_dir.join(format!("{}.out", self.jobname));

        fs::write(self.work_dir.join(&deck), input)?;
        // stale output must never be mistaken for a fresh result
        if out.exists() {
            fs::remove_file(&out)?;
        }

        let output = Command::new(&self.executable)
            .arg(&deck)
            .current_dir(&self.work_dir)
            .output()?;

        if !output.status.success() {
            return Err(EvalError::Process {
                engine: self.executable.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(fs::read_to_string(&out)?)
    }
}

/// Checks for the SCF convergence banner.
pub fn check_convergence(output: &str) -> bool {
    output.lines().any(|l| l.contains(SCF_MARKER))
}

// Everything after the first SCF convergence banner.
fn converged_section(output: &str) -> Option<&str> {
    output.find(SCF_MARKER).map(|pos| &output[pos..])
}

/// Final heat of formation in kJ/mol.
pub fn parse_heat_of_formation(output: &str) -> Result<f64, EvalError> {
    let section = converged_section(output).ok_or_else(|| EvalError::NotConverged("MOPAC".into()))?;

    let caps = heat_of_formation_re()?
        .captures(section)
        .ok_or_else(|| EvalError::Parse("final heat of formation not found".into()))?;

    let kcal: f64 = caps[1]
        .parse()
        .map_err(|_| EvalError::Parse(format!("bad heat of formation '{}'", &caps[1])))?;
    Ok(kcal * KCAL_TO_KJ)
}

pub fn parse_gradient_norm(output: &str) -> Option<f64> {
    let section = converged_section(output)?;
    section
        .lines()
        .filter(|l| l.contains("GRADIENT NORM"))
        .filter_map(|l| l.split('=').nth(1))
        .filter_map(|rhs| rhs.split_whitespace().next())
        .filter_map(|tok| tok.parse::<f64>().ok())
        .next()
}

/// Reads the last Cartesian block after the convergence banner.
pub fn parse_geometry(output: &str, natoms: usize) -> Result<Vec<Point3<f64>>, EvalError> {
    let section = converged_section(output).ok_or_else(|| EvalError::NotConverged("MOPAC".into()))?;
    let start = section
        .rfind("CARTESIAN COORDINATES")
        .ok_or_else(|| EvalError::Parse("optimized Cartesian coordinates not found".into()))?;
    let lines = section[start..].lines().skip(1);

    let mut xyz = Vec::with_capacity(natoms);
    for line in lines {
        if xyz.len() == natoms {
            break;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        // rows look like "  1  C  0.0000  0.0000  0.0000"
        if parts.len() < 5 || parts[0].parse::<usize>().is_err() {
            if xyz.is_empty() {
                continue; // header and blank lines
            }
            break;
        }
        let mut c = [0.0; 3];
        for (k, tok) in parts[2..5].iter().enumerate() {
            c[k] = tok
                .parse()
                .map_err(|_| EvalError::Parse(format!("bad coordinate '{}'", tok)))?;
        }
        xyz.push(Point3::new(c[0], c[1], c[2]));
    }

    if xyz.len() != natoms {
        return Err(EvalError::AtomCountMismatch {
            expected: natoms,
            found: xyz.len(),
        });
    }
    Ok(xyz)
}

impl Evaluator for MopacEvaluator {
    fn name(&self) -> &str {
        "MOPAC"
    }

    fn evaluate(&self, molecule: &Molecule) -> Result<EvaluationResult, EvalError> {
        let input = self.generate_input(molecule);
        let output = self.run_process(&input)?;

        if !check_convergence(&output) {
            return Err(EvalError::NotConverged(self.jobname.clone()));
        }

        let energy = parse_heat_of_formation(&output)?;
        let relaxed = if self.optimize {
            Some(parse_geometry(&output, molecule.num_atoms())?)
        } else {
            None
        };

        Ok(EvaluationResult {
            energy,
            gradient_norm: parse_gradient_norm(&output),
            relaxed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
 PM6-D GEO-OK PRECISE
          SCF FIELD WAS ACHIEVED

          FINAL HEAT OF FORMATION =        -57.79543 KCAL/MOL =    -241.81407 KJ/MOL

          GRADIENT NORM             =          0.03172

                             CARTESIAN COORDINATES

   NO.       ATOM           X         Y         Z

     1       O          0.0000    0.0000    0.0000
     2       H          0.9569    0.0000    0.0000
     3       H         -0.2397    0.9264    0.0000

           Empirical Formula: H2 O  =     3 atoms
";

    fn water() -> Molecule {
        Molecule::from_xyz_str("3\nwater\nO 0 0 0\nH 0.96 0 0\nH -0.24 0.93 0\n").unwrap()
    }

    #[test]
    fn parses_heat_of_formation_in_kj() {
        let e = parse_heat_of_formation(OUTPUT).unwrap();
        assert!((e - (-57.79543 * KCAL_TO_KJ)).abs() < 1e-9);
    }

    #[test]
    fn heat_of_formation_pattern_is_shared() {
        let a = heat_of_formation_re().unwrap();
        let b = heat_of_formation_re().unwrap();
        assert!(std::ptr::eq(a, b));
        assert!(parse_heat_of_formation(OUTPUT).is_ok());
    }

    #[test]
    fn parses_gradient_norm() {
        assert_eq!(parse_gradient_norm(OUTPUT), Some(0.03172));
    }

    #[test]
    fn parses_cartesian_block() {
        let xyz = parse_geometry(OUTPUT, 3).unwrap();
        assert_eq!(xyz.len(), 3);
        assert!((xyz[1].x - 0.9569).abs() < 1e-12);
        assert!((xyz[2].y - 0.9264).abs() < 1e-12);
    }

    #[test]
    fn detects_atom_count_mismatch() {
        let err = parse_geometry(OUTPUT, 4).unwrap_err();
        assert!(matches!(err, EvalError::AtomCountMismatch { expected: 4, found: 3 }));
    }

    #[test]
    fn unconverged_output_is_rejected() {
        let raw = "          FINAL HEAT OF FORMATION =  -1.0 KCAL/MOL\n";
        assert!(!check_convergence(raw));
        assert!(matches!(parse_heat_of_formation(raw), Err(EvalError::NotConverged(_))));
    }

    #[test]
    fn input_deck_layout() {
        let mopac = MopacEvaluator::new("mopac", MopacEvaluator::DEFAULT_KEYWORDS, "/tmp");
        let deck = mopac.generate_input(&water());
        let lines: Vec<&str> = deck.lines().collect();
        assert_eq!(lines[0], "PM6-D GEO-OK PRECISE");
        assert_eq!(lines[1], "water");
        assert_eq!(lines[2], "");
        assert_eq!(lines.len(), 6);
        assert!(lines[3].starts_with("O"));
        assert_eq!(lines[4].split_whitespace().filter(|t| *t == "1").count(), 3);

        let frozen = MopacEvaluator::new("mopac", "PM7 1SCF", "/tmp").single_point();
        assert!(frozen.generate_input(&water()).lines().nth(3).unwrap().ends_with('0'));
    }

    #[test]
    fn missing_executable_is_an_error() {
        let dir = std::env::temp_dir().join("gamss-mopac-missing");
        let mopac = MopacEvaluator::new("definitely-not-a-mopac-binary", "PM6", &dir);
        assert!(mopac.evaluate(&water()).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
