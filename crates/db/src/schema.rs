pub const HR_TABLE: &str = "hr_employee_attrition";

/// Table description handed to the query and hypothesis prompts.
pub const HR_SCHEMA_DESCRIPTION: &str = "\
Table hr_employee_attrition (one row per employee):

Demographics:
- age INTEGER: age in years
- gender TEXT: 'Male' or 'Female'
- maritalstatus TEXT: 'Single', 'Married' or 'Divorced'
- education INTEGER: education level, 1 (below college) to 5 (doctor)
- educationfield TEXT: 'Life Sciences', 'Medical', 'Marketing', 'Technical Degree', 'Human Resources' or 'Other'

Job:
- employeenumber INTEGER: unique employee id
- department TEXT: 'Sales', 'Research & Development' or 'Human Resources'
- jobrole TEXT: job title, e.g. 'Sales Executive', 'Research Scientist', 'Manager'
- joblevel INTEGER: 1 (entry) to 5 (executive)
- monthlyincome INTEGER: monthly salary
- percentsalaryhike INTEGER: last salary increase in percent
- performancerating INTEGER: 3 (excellent) or 4 (outstanding)

Work-life:
- overtime TEXT: 'Yes' or 'No'
- businesstravel TEXT: 'Non-Travel', 'Travel_Rarely' or 'Travel_Frequently'
- distancefromhome INTEGER: distance from home in km
- worklifebalance INTEGER: 1 (bad) to 4 (best)

Satisfaction (1 = low, 4 = very high):
- jobsatisfaction INTEGER
- environmentsatisfaction INTEGER
- relationshipsatisfaction INTEGER
- jobinvolvement INTEGER

Career:
- totalworkingyears INTEGER: total years of work experience
- yearsatcompany INTEGER: tenure at the company
- yearsincurrentrole INTEGER
- yearssincelastpromotion INTEGER
- yearswithcurrmanager INTEGER

Outcome:
- attrition TEXT: 'Yes' if the employee left, otherwise 'No'";

#[cfg(test)]
mod tests {
    use super::{HR_SCHEMA_DESCRIPTION, HR_TABLE};

    #[test]
    fn description_names_the_table_and_outcome_column() {
        assert!(HR_SCHEMA_DESCRIPTION.starts_with(&format!("Table {HR_TABLE}")));
        assert!(HR_SCHEMA_DESCRIPTION.contains("- attrition TEXT"));
    }
}
